use super::Error;
use evaluate::Value;
use schema::{Column, ColumnType};

/// Default staging watermark: a buffer past this many bytes is drained on
/// the next flush opportunity.
pub const DEFAULT_WATERMARK: usize = 8 << 20;

/// One table's staged, not-yet-flushed rows in COPY text encoding.
pub struct TableStage {
    buffer: String,
    rows: u64,
    watermark: usize,
}

impl TableStage {
    pub fn new(watermark: usize) -> Self {
        Self {
            buffer: String::new(),
            rows: 0,
            watermark,
        }
    }

    /// Append one encoded row. Returns true when the buffer has passed its
    /// watermark and should be drained.
    pub fn push(&mut self, encoded: &str) -> bool {
        self.buffer.push_str(encoded);
        self.rows += 1;
        self.buffer.len() >= self.watermark
    }

    /// Take the buffered batch, leaving the stage empty.
    pub fn drain(&mut self) -> Option<(String, u64)> {
        if self.buffer.is_empty() {
            return None;
        }
        let rows = std::mem::take(&mut self.rows);
        Some((std::mem::take(&mut self.buffer), rows))
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Encode one row as a COPY text line, values aligned with `columns`.
pub fn encode_row(table: &str, columns: &[Column], values: &[Value]) -> Result<String, Error> {
    if columns.len() != values.len() {
        return Err(Error::RowShape {
            table: table.to_string(),
            expect: columns.len(),
            found: values.len(),
        });
    }

    let mut line = String::new();
    for (index, (column, value)) in columns.iter().zip(values.iter()).enumerate() {
        if index > 0 {
            line.push('\t');
        }
        encode_field(&mut line, column, value)?;
    }
    line.push('\n');
    Ok(line)
}

fn encode_field(line: &mut String, column: &Column, value: &Value) -> Result<(), Error> {
    match value {
        Value::Null => line.push_str("\\N"),
        Value::Bool(b) => line.push(if *b { 't' } else { 'f' }),
        Value::Int(i) => line.push_str(&i.to_string()),
        Value::Real(f) => line.push_str(&format_real(*f)),
        Value::Text(s) => escape_into(line, s),
        Value::Json(v) => match column.ctype {
            ColumnType::Hstore => escape_into(line, &render_hstore(v)?),
            _ => escape_into(line, &serde_json::to_string(v).expect("JSON always serializes")),
        },
        Value::Geometry(geometry, srid) => line.push_str(&geometry.to_hex_ewkb(*srid)),
        // The bridge skips rows with failed geometries before they reach
        // the sink; one arriving here is a caller bug.
        Value::InvalidGeometry => {
            return Err(Error::Render {
                type_name: "geometry",
                value: "invalid geometry".to_string(),
            })
        }
    }
    Ok(())
}

// COPY text format: backslash, tab, newline and carriage return must be
// escaped; everything else passes through.
fn escape_into(line: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => line.push_str("\\\\"),
            '\t' => line.push_str("\\t"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            _ => line.push(c),
        }
    }
}

// hstore literal: "key"=>"value", pairs comma-separated, quotes and
// backslashes doubled inside quoted strings.
fn render_hstore(value: &serde_json::Value) -> Result<String, Error> {
    let serde_json::Value::Object(map) = value else {
        return Err(Error::Render {
            type_name: "hstore",
            value: value.to_string(),
        });
    };
    let mut out = String::new();
    for (index, (key, val)) in map.iter().enumerate() {
        let serde_json::Value::String(val) = val else {
            return Err(Error::Render {
                type_name: "hstore",
                value: val.to_string(),
            });
        };
        if index > 0 {
            out.push(',');
        }
        hstore_quote(&mut out, key);
        out.push_str("=>");
        hstore_quote(&mut out, val);
    }
    Ok(out)
}

fn hstore_quote(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

fn format_real(f: f64) -> String {
    let s = format!("{f}");
    if s == "-0" {
        "0".to_string()
    } else {
        s
    }
}
