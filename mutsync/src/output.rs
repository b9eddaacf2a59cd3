use crate::error::MutationError;
use anyhow::Result;
use serde_json::Value as JsonValue;
use std::io::{self, Write};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Yaml,
    Json,
    Raw,
}

pub fn emit_data(fmt: &OutputFormat, data: &JsonValue) -> Result<()> {
    match fmt {
        OutputFormat::Yaml => {
            let s = serde_yaml::to_string(data)?;
            println!("{}", s.trim_end());
        }
        OutputFormat::Json => {
            let s = serde_json::to_string_pretty(data)?;
            println!("{}", s);
        }
        OutputFormat::Raw => {
            if let Some(s) = data.as_str() {
                print!("{}", s);
            } else {
                print!("{}", serde_json::to_string(data)?);
            }
        }
    }
    Ok(())
}

/// Structured view of an error: mutation failures keep their status and
/// retry class, anything else becomes `{error: <chain>}`.
pub fn error_value(err: &anyhow::Error) -> JsonValue {
    let mut map = serde_json::Map::new();
    if let Some(m) = err.downcast_ref::<MutationError>() {
        if let Some(code) = m.status() {
            map.insert("code".into(), JsonValue::from(code));
        }
        map.insert("message".into(), JsonValue::String(m.to_string()));
        map.insert("retryable".into(), JsonValue::Bool(m.is_retryable()));
        if let MutationError::Http { body: Some(body), .. } = m {
            map.insert("body".into(), body.clone());
        }
    } else {
        map.insert("error".into(), JsonValue::String(format!("{:#}", err)));
    }
    JsonValue::Object(map)
}

pub fn emit_error(err: &anyhow::Error) -> Result<()> {
    let s = serde_yaml::to_string(&error_value(err))?;
    let _ = writeln!(io::stderr(), "{}", s.trim_end());
    Ok(())
}
