//! Seat registry.
//!
//! Loads seat definitions from a JSON descriptor. Two authoring modes:
//! an explicit `seats` list (per-seat `roi` rectangle or `poly` vertex
//! list), or a `tables` list where each table polygon carries a
//! `seat_layout` string like `"2x2"` that is subdivided into evenly
//! sized rectangular seats with sequential ids.
//!
//! A missing or unparseable descriptor yields an empty registry; the
//! driver warns about it at startup but the classifier keeps running.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geometry::{polygon_bounding_rect, Point, Rect};

/// One seat region. `polygon` is preferred over `rect` for assignment
/// whenever it has at least three vertices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeatDefinition {
    pub seat_id: i32,
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub polygon: Vec<Point>,
}

impl SeatDefinition {
    pub fn has_polygon(&self) -> bool {
        self.polygon.len() >= 3
    }
}

#[derive(Clone, Debug, Default)]
pub struct SeatRegistry {
    seats: Vec<SeatDefinition>,
}

impl SeatRegistry {
    pub fn new(seats: Vec<SeatDefinition>) -> Self {
        Self { seats }
    }

    /// Load a registry from a descriptor file. Never errors: a missing
    /// file or malformed document logs a warning and returns an empty
    /// registry.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("seat descriptor {} unreadable: {e}", path.display());
                return Self::default();
            }
        };
        let root: Value = match serde_json::from_str(&text) {
            Ok(root) => root,
            Err(e) => {
                log::warn!("seat descriptor {} is not valid JSON: {e}", path.display());
                return Self::default();
            }
        };
        let registry = Self::from_descriptor(&root);
        if registry.is_empty() {
            log::warn!("seat descriptor {} yielded no seats", path.display());
        }
        registry
    }

    fn from_descriptor(root: &Value) -> Self {
        if let Some(seats) = root.get("seats").and_then(Value::as_array) {
            let parsed = seats.iter().filter_map(parse_seat).collect();
            return Self::new(parsed);
        }
        if let Some(tables) = root.get("tables").and_then(Value::as_array) {
            let mut out = Vec::new();
            for table in tables {
                out.extend(subdivide_table(table));
            }
            return Self::new(out);
        }
        Self::default()
    }

    /// Save the explicit-seats form of the descriptor. Polygon seats
    /// keep their polygon; rectangle-only seats write a `roi`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let seats: Vec<Value> = self
            .seats
            .iter()
            .map(|seat| {
                let mut entry = serde_json::json!({ "seat_id": seat.seat_id });
                if seat.has_polygon() {
                    let poly: Vec<[i32; 2]> =
                        seat.polygon.iter().map(|p| [p.x, p.y]).collect();
                    entry["poly"] = serde_json::json!(poly);
                } else {
                    entry["roi"] = serde_json::json!({
                        "x": seat.rect.x,
                        "y": seat.rect.y,
                        "w": seat.rect.w,
                        "h": seat.rect.h,
                    });
                }
                entry
            })
            .collect();
        let root = serde_json::json!({ "seats": seats });
        let text = serde_json::to_string_pretty(&root)?;
        fs::write(path, text)
            .with_context(|| format!("failed to write seat descriptor {}", path.display()))
    }

    pub fn seats(&self) -> &[SeatDefinition] {
        &self.seats
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

fn parse_rect(value: &Value) -> Rect {
    let field = |k: &str| value.get(k).and_then(Value::as_i64).unwrap_or(0) as i32;
    Rect::new(field("x"), field("y"), field("w"), field("h"))
}

fn parse_polygon(value: &Value) -> Vec<Point> {
    value
        .as_array()
        .map(|points| {
            points
                .iter()
                .filter_map(|p| {
                    let arr = p.as_array()?;
                    Some(Point::new(
                        arr.first()?.as_i64()? as i32,
                        arr.get(1)?.as_i64()? as i32,
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Seat ids may be integers or strings like `"A12"`; strings contribute
/// their digit characters. An id that parses to nothing becomes -1.
fn parse_seat_id(value: Option<&Value>) -> i32 {
    match value {
        Some(Value::Number(n)) => n.as_i64().map(|v| v as i32).unwrap_or(-1),
        Some(Value::String(s)) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(-1)
        }
        _ => -1,
    }
}

fn parse_seat(entry: &Value) -> Option<SeatDefinition> {
    let seat_id = parse_seat_id(entry.get("seat_id"));
    let rect = entry.get("roi").map(parse_rect);
    let polygon = entry.get("poly").map(parse_polygon).unwrap_or_default();
    let rect = match (rect, polygon.len() >= 3) {
        (Some(rect), _) => rect,
        (None, true) => polygon_bounding_rect(&polygon),
        (None, false) => return None,
    };
    Some(SeatDefinition {
        seat_id,
        rect,
        polygon,
    })
}

/// Subdivide a table's bounding rectangle into an `RxC` grid of seats.
/// Ids are `table_id * 100 + i + 1` in row-major order.
fn subdivide_table(table: &Value) -> Vec<SeatDefinition> {
    let polygon = match (table.get("poly"), table.get("roi")) {
        (Some(poly), _) => parse_polygon(poly),
        (None, Some(roi)) => {
            let r = parse_rect(roi);
            vec![
                Point::new(r.x, r.y),
                Point::new(r.x + r.w, r.y),
                Point::new(r.x + r.w, r.y + r.h),
                Point::new(r.x, r.y + r.h),
            ]
        }
        (None, None) => return Vec::new(),
    };
    if polygon.is_empty() {
        return Vec::new();
    }
    let layout = table
        .get("seat_layout")
        .and_then(Value::as_str)
        .unwrap_or("2x2");
    let (rows, cols) = parse_layout(layout);
    let bounds = polygon_bounding_rect(&polygon);
    let base = table.get("table_id").and_then(Value::as_i64).unwrap_or(0) as i32 * 100;

    let cell_w = bounds.w / cols;
    let cell_h = bounds.h / rows;
    let mut out = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            let i = r * cols + c;
            out.push(SeatDefinition {
                seat_id: base + i + 1,
                rect: Rect::new(bounds.x + c * cell_w, bounds.y + r * cell_h, cell_w, cell_h),
                polygon: Vec::new(),
            });
        }
    }
    out
}

fn parse_layout(layout: &str) -> (i32, i32) {
    let mut parts = layout.splitn(2, 'x');
    let rows = parts
        .next()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .unwrap_or(1)
        .max(1);
    let cols = parts
        .next()
        .and_then(|s| s.trim().parse::<i32>().ok())
        .unwrap_or(1)
        .max(1);
    (rows, cols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_seats_parse_rect_and_polygon() {
        let root: Value = serde_json::from_str(
            r#"{"seats": [
                {"seat_id": 1, "roi": {"x": 10, "y": 20, "w": 30, "h": 40}},
                {"seat_id": "A12", "poly": [[0,0],[10,0],[10,10],[0,10]]}
            ]}"#,
        )
        .unwrap();
        let reg = SeatRegistry::from_descriptor(&root);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.seats()[0].seat_id, 1);
        assert_eq!(reg.seats()[0].rect, Rect::new(10, 20, 30, 40));
        assert_eq!(reg.seats()[1].seat_id, 12);
        assert!(reg.seats()[1].has_polygon());
        assert_eq!(reg.seats()[1].rect, Rect::new(0, 0, 10, 10));
    }

    #[test]
    fn string_seat_id_without_digits_is_minus_one() {
        assert_eq!(parse_seat_id(Some(&Value::String("north".into()))), -1);
        assert_eq!(parse_seat_id(Some(&Value::String("B7".into()))), 7);
        assert_eq!(parse_seat_id(None), -1);
    }

    #[test]
    fn table_subdivision_assigns_sequential_ids() {
        let root: Value = serde_json::from_str(
            r#"{"tables": [
                {"table_id": 3, "roi": {"x": 0, "y": 0, "w": 100, "h": 50}, "seat_layout": "2x2"}
            ]}"#,
        )
        .unwrap();
        let reg = SeatRegistry::from_descriptor(&root);
        assert_eq!(reg.len(), 4);
        let ids: Vec<i32> = reg.seats().iter().map(|s| s.seat_id).collect();
        assert_eq!(ids, vec![301, 302, 303, 304]);
        assert_eq!(reg.seats()[0].rect, Rect::new(0, 0, 50, 25));
        assert_eq!(reg.seats()[3].rect, Rect::new(50, 25, 50, 25));
    }

    #[test]
    fn bad_layout_string_falls_back_to_single_cell() {
        assert_eq!(parse_layout("garbage"), (1, 1));
        assert_eq!(parse_layout("3x"), (3, 1));
        assert_eq!(parse_layout("2x5"), (2, 5));
    }

    #[test]
    fn missing_file_yields_empty_registry() {
        let reg = SeatRegistry::load("/nonexistent/seats.json");
        assert!(reg.is_empty());
    }
}
