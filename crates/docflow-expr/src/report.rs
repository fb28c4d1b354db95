use crate::parser::ParseError;
use ariadne::{Config, Label, Report, ReportKind, Source};
use std::io::Cursor;

/// Renders parse errors as plain-text ariadne reports, one after another.
pub fn report_parse_errors(filename: &str, source_code: &str, errors: &[ParseError]) -> String {
    let mut rendered = String::new();
    for error in errors {
        let mut report_bytes = Cursor::new(Vec::new());
        let written = Report::build(ReportKind::Error, (filename, error.span.clone()))
            .with_config(Config::default().with_color(false))
            .with_message("Invalid math expression")
            .with_label(Label::new((filename, error.span.clone())).with_message(&error.message))
            .finish()
            .write((filename, Source::from(source_code)), &mut report_bytes);
        match written {
            Ok(()) => rendered.push_str(&String::from_utf8_lossy(report_bytes.get_ref())),
            Err(_) => {
                rendered.push_str(&error.message);
                rendered.push('\n');
            }
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn renders_label_for_bad_input() {
        let source = "1 + * 2";
        let errors = parse(source).unwrap_err();
        let rendered = report_parse_errors("value", source, &errors);
        assert!(rendered.contains("Invalid math expression"));
        assert!(rendered.contains("value"));
    }
}
