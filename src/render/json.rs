use serde::Serialize;

use crate::error::LactError;

pub(crate) fn to_pretty<T: Serialize>(value: &T) -> Result<String, LactError> {
    Ok(serde_json::to_string_pretty(value)?)
}
