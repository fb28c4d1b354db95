//! The document worker behind its async handle.

use docflow::service::channel;
use docflow::{CoreConfig, DocumentCore, SerializedComponent, ServiceError, UpdateOptions, Value};

fn core() -> DocumentCore {
    let root = SerializedComponent::new("document")
        .child(SerializedComponent::new("number").named("n").text("37/3"))
        .child(SerializedComponent::new("textInput").named("in"));
    DocumentCore::with_config(&root, &CoreConfig::default()).unwrap()
}

#[tokio::test]
async fn handles_share_one_worker() {
    let (handle, worker) = channel(core());
    let other = handle.clone();
    let (core, ()) = tokio::join!(worker.run(), async move {
        assert_eq!(handle.resolve("n", "isInteger").await.unwrap(), Value::Bool(false));
        let outcome = other
            .request_value("n", "value", Value::Number(12.0), UpdateOptions::default())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(handle.resolve("n", "isInteger").await.unwrap(), Value::Bool(true));

        let typed = other
            .perform_action("in", "updateImmediateValue", Value::text("hi"), UpdateOptions::default())
            .await
            .unwrap();
        assert!(typed.success);
        let state = handle.renderer_state().await.unwrap();
        assert!(
            state
                .iter()
                .any(|entry| entry.component == "in" && entry.variable == "immediateValue" && entry.value == Value::text("hi"))
        );
        assert!(handle.diagnostics().await.unwrap().is_empty());
    });
    assert_eq!(core.history().len(), 1);
}

#[tokio::test]
async fn core_errors_pass_through() {
    let (handle, worker) = channel(core());
    let ((), ()) = tokio::join!(
        async {
            worker.run().await;
        },
        async move {
            let error = handle.resolve("nobody", "value").await.unwrap_err();
            assert!(matches!(error, ServiceError::Core(_)));
        }
    );
}

#[tokio::test]
async fn stopped_worker_reports_closed() {
    let (handle, worker) = channel(core());
    drop(worker);
    assert_eq!(handle.resolve("n", "value").await, Err(ServiceError::Closed));
}
