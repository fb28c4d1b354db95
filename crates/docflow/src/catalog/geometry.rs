//! Points and polygons.
//!
//! Coordinates are array variables so that dragging one coordinate, or one
//! vertex, only touches the entries involved.

use super::{ActionDef, ActionPlan, ComponentType};
use crate::component::attributes::AttributeSchema;
use crate::config::CoreConfig;
use crate::statevar::array::ArrayDef;
use crate::statevar::dependency::{ComponentTarget, Dependency, DependencySpec};
use crate::statevar::inverse::InverseInstruction;
use crate::statevar::{Definition, StateVarDef};
use crate::value::Value;
use docflow_expr::Expr;
use std::collections::BTreeMap;

/// Displacements closer than this count as equal.
const SAME_DISPLACEMENT: f64 = 1e-9;

fn constant(expr: Option<&Expr>) -> f64 {
    expr.and_then(Expr::evaluate_to_constant).unwrap_or(f64::NAN)
}

pub struct Point;

impl ComponentType for Point {
    fn name(&self) -> &'static str {
        "point"
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        vec![AttributeSchema::math("coords", Value::Null).stored_as("specifiedCoords")]
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        let xs = ArrayDef::new(1)
            .entry_prefix("x")
            .size_dependencies(|_| DependencySpec::new().with("coords", Dependency::own("specifiedCoords")))
            .size(|deps| match deps.value("coords").as_math() {
                Some(expr) => vec![expr.dimension()],
                None => vec![2],
            })
            .global_dependencies(|_| DependencySpec::new().with("coords", Dependency::own("specifiedCoords")))
            .definition_by_key(|entry| {
                let specified = entry
                    .global
                    .value("coords")
                    .as_math()
                    .and_then(|expr| expr.component(entry.key))
                    .and_then(Expr::evaluate_to_constant)
                    .unwrap_or(0.0);
                Definition::essential_or(Value::Number(specified))
            });
        vec![
            StateVarDef::array("xs", xs).essential(Value::Null),
            StateVarDef::scalar("coords")
                .for_renderer()
                .dependencies(|_| DependencySpec::new().with("xs", Dependency::own("xs")))
                .definition(|deps| {
                    let xs = deps.value("xs").as_array().unwrap_or_default();
                    Definition::value(Expr::tuple_of_numbers(xs.iter().map(Value::to_number)))
                })
                .inverse(|ctx| {
                    let math = ctx.desired.to_math();
                    let Some(expr) = math.as_math() else {
                        return Err(format!("'{}' is not a point", ctx.desired));
                    };
                    let xs = (0..expr.dimension())
                        .map(|index| Value::Number(constant(expr.component(index))))
                        .collect::<Vec<_>>();
                    Ok(vec![InverseInstruction::dependency("xs", Value::array(xs))])
                }),
        ]
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![ActionDef::new("movePoint", &[], |ctx| {
            let coordinates: Vec<Value> = match ctx.args.as_array() {
                Some(items) => items.to_vec(),
                None => ["x", "y", "z"]
                    .iter()
                    .map(|axis| ctx.args.field(axis).clone())
                    .take_while(|value| !value.is_null())
                    .collect(),
            };
            if coordinates.is_empty() {
                return Err("expected x and y".to_string());
            }
            let requests = coordinates
                .into_iter()
                .enumerate()
                .map(|(index, value)| ctx.request(&format!("x{}", index + 1), Value::Number(value.to_number())))
                .collect();
            Ok(ActionPlan {
                requests,
                ..ActionPlan::default()
            })
        })]
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("xs")
    }
}

/// Rows of a vertex list such as `(0,0), (4,0), (0,3)`.
fn vertex_rows(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::List(items) => items.iter().collect(),
        Expr::Tuple(items) if items.iter().all(|item| matches!(item, Expr::Tuple(_))) => items.iter().collect(),
        single => vec![single],
    }
}

/// How a rigid polygon answers a request to move some of its vertices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RigidMotion {
    Translate { dx: f64, dy: f64 },
    Rotate { center: (f64, f64), angle: f64 },
    /// Moved vertices go where asked, the others stay.
    Free,
}

/// One moved vertex turns the polygon about its centroid; several moved by
/// the same displacement shift it. Anything else cannot keep the shape.
pub fn rigid_motion(current: &[(f64, f64)], moved: &BTreeMap<usize, (f64, f64)>) -> RigidMotion {
    match moved.len() {
        0 => RigidMotion::Free,
        1 => {
            let Some((index, target)) = moved.iter().next() else {
                return RigidMotion::Free;
            };
            let Some(&(x, y)) = current.get(*index) else {
                return RigidMotion::Free;
            };
            let center = centroid(current);
            let from = (x - center.0, y - center.1);
            let to = (target.0 - center.0, target.1 - center.1);
            if from.0.hypot(from.1) < SAME_DISPLACEMENT || to.0.hypot(to.1) < SAME_DISPLACEMENT {
                return RigidMotion::Free;
            }
            let angle = to.1.atan2(to.0) - from.1.atan2(from.0);
            RigidMotion::Rotate { center, angle }
        }
        _ => {
            let mut displacements = moved.iter().filter_map(|(index, target)| {
                let (x, y) = current.get(*index)?;
                Some((target.0 - x, target.1 - y))
            });
            let Some(first) = displacements.next() else {
                return RigidMotion::Free;
            };
            let same = displacements
                .all(|d| (d.0 - first.0).abs() < SAME_DISPLACEMENT && (d.1 - first.1).abs() < SAME_DISPLACEMENT);
            if same {
                RigidMotion::Translate {
                    dx: first.0,
                    dy: first.1,
                }
            } else {
                RigidMotion::Free
            }
        }
    }
}

impl RigidMotion {
    pub fn apply(&self, current: &[(f64, f64)], moved: &BTreeMap<usize, (f64, f64)>) -> Vec<(f64, f64)> {
        match *self {
            Self::Translate { dx, dy } => current.iter().map(|(x, y)| (x + dx, y + dy)).collect(),
            Self::Rotate { center, angle } => {
                let (sin, cos) = angle.sin_cos();
                current
                    .iter()
                    .map(|(x, y)| {
                        let (rx, ry) = (x - center.0, y - center.1);
                        (center.0 + rx * cos - ry * sin, center.1 + rx * sin + ry * cos)
                    })
                    .collect()
            }
            Self::Free => current
                .iter()
                .enumerate()
                .map(|(index, vertex)| moved.get(&index).copied().unwrap_or(*vertex))
                .collect(),
        }
    }
}

fn displaced(from: (f64, f64), to: (f64, f64)) -> bool {
    !((to.0 - from.0).abs() < SAME_DISPLACEMENT && (to.1 - from.1).abs() < SAME_DISPLACEMENT)
}

/// `(x, y)` given as a two-entry array or a math pair.
fn pair_of(value: &Value) -> Option<(f64, f64)> {
    if let Some(items) = value.as_array() {
        return match items {
            [x, y] => Some((x.to_number(), y.to_number())),
            _ => None,
        };
    }
    let math = value.to_math();
    let expr = math.as_math()?;
    (expr.dimension() == 2).then(|| (constant(expr.component(0)), constant(expr.component(1))))
}

fn centroid(vertices: &[(f64, f64)]) -> (f64, f64) {
    if vertices.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let count = vertices.len() as f64;
    let (sx, sy) = vertices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    (sx / count, sy / count)
}

fn pairs(flat: &[Value]) -> Vec<(f64, f64)> {
    flat.chunks(2)
        .map(|row| (row[0].to_number(), row.get(1).map_or(f64::NAN, Value::to_number)))
        .collect()
}

pub struct Polygon;

impl ComponentType for Polygon {
    fn name(&self) -> &'static str {
        "polygon"
    }

    fn attributes(&self) -> Vec<AttributeSchema> {
        vec![
            AttributeSchema::math("vertices", Value::Null).stored_as("specifiedVertices"),
            AttributeSchema::boolean("rigid", false),
        ]
    }

    fn state_variables(&self, _config: &CoreConfig) -> Vec<StateVarDef> {
        let vertices = ArrayDef::new(2)
            .entry_prefix("vertex")
            .size_dependencies(|_| DependencySpec::new().with("count", Dependency::own("numVertices")))
            .size(|deps| vec![deps.number("count").max(0.0) as usize, 2])
            .global_dependencies(|_| {
                DependencySpec::new()
                    .with("specified", Dependency::own("specifiedVertices"))
                    .with("rigid", Dependency::own("rigid"))
            })
            .dependencies_by_key(|key, shape, determining| {
                if determining.get("numChildPoints").to_number() > 0.0 {
                    let columns = shape.get(1).copied().unwrap_or(2).max(1);
                    let point = ComponentTarget::Child {
                        types: vec!["point".to_string()],
                        index: key / columns,
                    };
                    DependencySpec::new().with("child", Dependency::array_entry(point, "xs", key % columns))
                } else {
                    DependencySpec::new()
                }
            })
            .definition_by_key(|entry| {
                if entry.dependencies.is_present("child") {
                    return Definition::value(entry.dependencies.value("child").clone());
                }
                let (row, column) = entry.row_column();
                let specified = entry
                    .global
                    .value("specified")
                    .as_math()
                    .and_then(|expr| vertex_rows(expr).get(row).and_then(|vertex| vertex.component(column)))
                    .and_then(Expr::evaluate_to_constant)
                    .unwrap_or(f64::NAN);
                Definition::essential_or(Value::Number(specified))
            })
            .inverse_by_key(|ctx| {
                let current = pairs(ctx.current);
                let mut moved = BTreeMap::new();
                for key in ctx.desired.keys() {
                    let row = key / 2;
                    let target = (ctx.merged(row * 2).to_number(), ctx.merged(row * 2 + 1).to_number());
                    // Rows restated at their current position are not moves.
                    if current.get(row).is_none_or(|from| displaced(*from, target)) {
                        moved.insert(row, target);
                    }
                }
                let motion = if ctx.global.value("rigid").as_bool() == Some(true) {
                    rigid_motion(&current, &moved)
                } else {
                    RigidMotion::Free
                };
                log::trace!("polygon inverse: {motion:?}");
                let updated = motion.apply(&current, &moved);

                let mut instructions = Vec::new();
                let mut essential = BTreeMap::new();
                for (row, (x, y)) in updated.into_iter().enumerate() {
                    for (column, coordinate) in [x, y].into_iter().enumerate() {
                        let key = row * 2 + column;
                        if motion == RigidMotion::Free && !ctx.desired.contains_key(&key) {
                            continue;
                        }
                        let from_child = ctx
                            .key_dependencies(key)
                            .is_some_and(|deps| deps.is_present("child"));
                        if from_child {
                            instructions.push(InverseInstruction::keyed("child", key, Value::Number(coordinate)));
                        } else {
                            essential.insert(key, Value::Number(coordinate));
                        }
                    }
                }
                if !essential.is_empty() {
                    instructions.push(InverseInstruction::SetEssentialEntries(essential));
                }
                Ok(instructions)
            });

        vec![
            StateVarDef::scalar("numChildPoints")
                .dependencies(|_| DependencySpec::new().with("points", Dependency::children(&["point"], None)))
                .definition(|deps| Definition::value(deps.children("points").len() as f64)),
            StateVarDef::scalar("numVertices")
                .dependencies(|_| {
                    DependencySpec::new()
                        .with("points", Dependency::own("numChildPoints"))
                        .with("specified", Dependency::own("specifiedVertices"))
                })
                .definition(|deps| {
                    let points = deps.number("points");
                    if points > 0.0 {
                        return Definition::value(points);
                    }
                    let count = deps.value("specified").as_math().map_or(0, |expr| vertex_rows(expr).len());
                    Definition::value(count as f64)
                }),
            StateVarDef::array("vertices", vertices)
                .determined_by(&["numChildPoints"])
                .essential(Value::Null)
                .for_renderer(),
            StateVarDef::scalar("centroid")
                .dependencies(|_| DependencySpec::new().with("vertices", Dependency::own("vertices")))
                .definition(|deps| {
                    let flat = ArrayDef::flatten_value(deps.value("vertices")).unwrap_or_default();
                    let (x, y) = centroid(&pairs(&flat));
                    Definition::value(Expr::tuple_of_numbers([x, y]))
                }),
        ]
    }

    fn actions(&self) -> Vec<ActionDef> {
        vec![ActionDef::new("movePolygon", &["vertices"], |ctx| {
            let requested = ctx.args.field("vertices");
            // `{ "2": (x, y) }` moves vertex 2 alone.
            if let Some(rows) = requested.as_record() {
                let mut requests = Vec::new();
                for (index, value) in rows {
                    let row = index
                        .parse::<usize>()
                        .ok()
                        .filter(|row| *row > 0)
                        .ok_or_else(|| format!("'{index}' is not a vertex number"))?;
                    let (x, y) = pair_of(value).ok_or_else(|| format!("vertex {row}: '{value}' is not a point"))?;
                    requests.push(ctx.request(&format!("vertex{row}_1"), Value::Number(x)));
                    requests.push(ctx.request(&format!("vertex{row}_2"), Value::Number(y)));
                }
                return Ok(ActionPlan {
                    requests,
                    ..ActionPlan::default()
                });
            }
            let desired = if requested.is_null() {
                let (dx, dy) = (ctx.args.field("dx").to_number(), ctx.args.field("dy").to_number());
                if !dx.is_finite() || !dy.is_finite() {
                    return Err("expected vertices or dx and dy".to_string());
                }
                let flat = ArrayDef::flatten_value(&ctx.read("vertices")).unwrap_or_default();
                let shifted = pairs(&flat)
                    .into_iter()
                    .flat_map(|(x, y)| [Value::Number(x + dx), Value::Number(y + dy)]);
                Value::array(shifted)
            } else {
                requested.clone()
            };
            Ok(ActionPlan {
                requests: vec![ctx.request("vertices", desired)],
                ..ActionPlan::default()
            })
        })]
    }

    fn primary_variable(&self) -> Option<&'static str> {
        Some("vertices")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: [(f64, f64); 3] = [(0.0, 0.0), (3.0, 0.0), (0.0, 3.0)];

    #[test]
    fn two_matching_moves_translate() {
        let moved = BTreeMap::from([(0, (1.0, 1.0)), (2, (1.0, 4.0))]);
        assert_eq!(rigid_motion(&TRIANGLE, &moved), RigidMotion::Translate { dx: 1.0, dy: 1.0 });
    }

    #[test]
    fn two_different_moves_are_free() {
        let moved = BTreeMap::from([(0, (1.0, 1.0)), (1, (5.0, 0.0))]);
        let motion = rigid_motion(&TRIANGLE, &moved);
        assert_eq!(motion, RigidMotion::Free);
        assert_eq!(motion.apply(&TRIANGLE, &moved), vec![(1.0, 1.0), (5.0, 0.0), (0.0, 3.0)]);
    }

    #[test]
    fn one_move_rotates_about_the_centroid() {
        let moved = BTreeMap::from([(1, (1.0, 4.0))]);
        let motion = rigid_motion(&TRIANGLE, &moved);
        let RigidMotion::Rotate { center, .. } = motion else {
            panic!("expected a rotation, got {motion:?}");
        };
        assert_eq!(center, (1.0, 1.0));
        let rotated = motion.apply(&TRIANGLE, &moved);
        let (cx, cy) = centroid(&rotated);
        assert!((cx - 1.0).abs() < 1e-9 && (cy - 1.0).abs() < 1e-9);
        let side = |a: (f64, f64), b: (f64, f64)| (a.0 - b.0).hypot(a.1 - b.1);
        assert!((side(rotated[0], rotated[1]) - 3.0).abs() < 1e-9);
        // The moved vertex ends up on the ray towards its target.
        let (tx, ty) = (1.0 - 1.0, 4.0 - 1.0);
        let (rx, ry) = (rotated[1].0 - 1.0, rotated[1].1 - 1.0);
        assert!((tx * ry - ty * rx).abs() < 1e-9);
    }

    #[test]
    fn points_given_as_pairs() {
        let pair = Value::array([Value::Number(4.0), Value::Number(1.0)]);
        assert_eq!(pair_of(&pair), Some((4.0, 1.0)));
        assert_eq!(pair_of(&Value::array([Value::Number(4.0)])), None);
        assert!(!displaced((4.0, 1.0), (4.0 + 1e-12, 1.0)));
        assert!(displaced((4.0, 1.0), (4.0, 1.5)));
    }

    #[test]
    fn vertex_lists_and_single_tuples() {
        let list = docflow_expr::parse("(0,0), (4,0), (0,3)").unwrap();
        assert_eq!(vertex_rows(&list).len(), 3);
        let single = docflow_expr::parse("(1,2)").unwrap();
        assert_eq!(vertex_rows(&single).len(), 1);
    }
}
