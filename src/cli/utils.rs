use serde_json::{json, Map, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data_value) = data {
                response["data"] = data_value;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output one or many records
pub fn output_records(output_format: OutputFormat, data: &Value) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        OutputFormat::Text => match data {
            Value::Array(records) if records.is_empty() => println!("No records"),
            Value::Array(records) => {
                for record in records {
                    println!("{}", record_line(record));
                }
            }
            other => println!("{}", record_line(other)),
        },
    }
    Ok(())
}

/// One-line text rendering: `id  field=value ...`
pub fn record_line(record: &Value) -> String {
    let Value::Object(fields) = record else {
        return record.to_string();
    };

    let id = fields.get("id").and_then(Value::as_str).unwrap_or("-");
    let rest: Vec<String> = fields
        .iter()
        .filter(|(key, _)| key.as_str() != "id")
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect();

    if rest.is_empty() {
        id.to_string()
    } else {
        format!("{}  {}", id, rest.join(" "))
    }
}

/// Parse `field=prefix` search terms
pub fn parse_search_terms(terms: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut parsed = Map::new();
    for term in terms {
        let Some((field, prefix)) = term.split_once('=') else {
            anyhow::bail!("search term '{}' must look like field=prefix", term);
        };
        if field.is_empty() {
            anyhow::bail!("search term '{}' has an empty field name", term);
        }
        parsed.insert(field.to_string(), Value::String(prefix.to_string()));
    }
    Ok(parsed)
}

/// Read a JSON document from stdin
pub fn read_json_stdin() -> anyhow::Result<Value> {
    let stdin = std::io::stdin();
    let value = serde_json::from_reader(stdin.lock())?;
    Ok(value)
}
