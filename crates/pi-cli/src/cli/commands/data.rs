use super::print_json;
use crate::cli::args::{DataAction, DataArgs};
use crate::exit_codes::{FAILED, SUCCESS};
use anyhow::{bail, Context};
use pi_core::{DataLayer, UserValue};
use serde_json::Value;

pub fn run(layer: &DataLayer, args: DataArgs) -> anyhow::Result<i32> {
    let store = &layer.user_data;
    let module = args.module.as_deref();
    let uid = match args.uid.as_slice() {
        [] => bail!("--uid is required"),
        [uid] => *uid,
        _ if matches!(args.action, DataAction::Get | DataAction::Delete) => 0,
        _ => bail!("{:?} takes a single --uid", args.action),
    };

    let ok = match args.action {
        DataAction::Get if args.uid.len() > 1 => {
            print_json(&store.get_many_detail(&args.uid, &args.name, module)?)?;
            true
        }
        DataAction::Get => {
            print_json(&store.get_detail(uid, &args.name, module)?)?;
            true
        }
        DataAction::Set => {
            let raw = args.value.context("--value is required")?;
            store.set(uid, &args.name, parse_value(&raw), module, args.ttl)
        }
        DataAction::Incr => {
            let delta = match args.value.as_deref() {
                Some(raw) => raw
                    .parse::<i64>()
                    .with_context(|| format!("--value {:?} is not an integer", raw))?,
                None => 1,
            };
            store.increment(uid, &args.name, delta, module, args.ttl)
        }
        DataAction::Delete => store.delete(&args.uid, &args.name, module),
    };
    Ok(if ok { SUCCESS } else { FAILED })
}

/// Integers are stored as integers, JSON objects and arrays as structured
/// values, anything else as text.
fn parse_value(raw: &str) -> UserValue {
    if let Ok(i) = raw.parse::<i64>() {
        return UserValue::Int(i);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => UserValue::Structured(v),
        _ => UserValue::Scalar(raw.to_string()),
    }
}
