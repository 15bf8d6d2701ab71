//! Template documents: loading from YAML/JSON and rendering back out.
//!
//! Templates are held as `serde_json::Value` with insertion-ordered maps, so
//! an exported template keeps the key order of its source. CloudFormation
//! short-form tags (`!Ref`, `!GetAtt`, `!Sub`, ...) are expanded to their
//! long form while loading, which lets either output format represent them.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use serde_yaml::value::TaggedValue;
use tracing::debug;

use crate::error::{PackageError, PackageResult};

/// Output rendering of an exported template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Pretty JSON, 4-space indent, non-ASCII characters kept as-is.
    Json,
    #[default]
    Yaml,
}

pub fn load_template(path: &Path) -> PackageResult<Value> {
    let source = fs::read_to_string(path).map_err(|e| PackageError::io(path, e))?;
    let document = parse_template(&source).map_err(|message| PackageError::TemplateParse {
        path: path.to_path_buf(),
        message,
    })?;
    debug!(path = %path.display(), "Parsed template");
    Ok(document)
}

/// Parses YAML (and therefore JSON) template source.
pub fn parse_template(source: &str) -> Result<Value, String> {
    let raw: serde_yaml::Value = serde_yaml::from_str(source).map_err(|e| e.to_string())?;
    let document = to_document(raw)?;
    if !document.is_object() {
        return Err("template root must be a mapping".to_string());
    }
    Ok(document)
}

pub fn render(document: &Value, format: OutputFormat) -> PackageResult<String> {
    match format {
        OutputFormat::Json => {
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            document
                .serialize(&mut serializer)
                .map_err(|e| PackageError::Serialization(e.to_string()))?;
            String::from_utf8(buf).map_err(|e| PackageError::Serialization(e.to_string()))
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(document).map_err(|e| PackageError::Serialization(e.to_string()))
        }
    }
}

fn to_document(value: serde_yaml::Value) -> Result<Value, String> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => Value::Number(to_number(&n)?),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(to_document)
                .collect::<Result<_, _>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut object = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                object.insert(mapping_key(key)?, to_document(value)?);
            }
            Value::Object(object)
        }
        serde_yaml::Value::Tagged(tagged) => expand_intrinsic(*tagged)?,
    })
}

fn to_number(n: &serde_yaml::Number) -> Result<Number, String> {
    if let Some(i) = n.as_i64() {
        Ok(Number::from(i))
    } else if let Some(u) = n.as_u64() {
        Ok(Number::from(u))
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .ok_or_else(|| format!("number {n} cannot be represented in a template"))
    }
}

fn mapping_key(key: serde_yaml::Value) -> Result<String, String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Null => Ok("null".to_string()),
        other => Err(format!("unsupported mapping key: {other:?}")),
    }
}

/// `!Ref x` → `{"Ref": x}`, `!GetAtt a.b` → `{"Fn::GetAtt": ["a", "b"]}`,
/// `!Condition c` → `{"Condition": c}`, `!Name v` → `{"Fn::Name": v}`.
fn expand_intrinsic(tagged: TaggedValue) -> Result<Value, String> {
    let tag = tagged.tag.to_string();
    let name = tag.trim_start_matches('!');
    let value = to_document(tagged.value)?;

    let (key, value) = match name {
        "Ref" | "Condition" => (name.to_string(), value),
        "GetAtt" => {
            let value = match value {
                Value::String(s) => match s.split_once('.') {
                    Some((resource, attribute)) => Value::Array(vec![
                        Value::String(resource.to_string()),
                        Value::String(attribute.to_string()),
                    ]),
                    None => Value::String(s),
                },
                other => other,
            };
            ("Fn::GetAtt".to_string(), value)
        }
        _ => (format!("Fn::{name}"), value),
    };

    let mut object = Map::with_capacity(1);
    object.insert(key, value);
    Ok(Value::Object(object))
}
