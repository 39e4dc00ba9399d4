use super::errors::{TicketError, TicketResult};
use crate::constants::fields;
use crate::state_machine::{ActionTicket, TaskAction};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reads typed values out of a ticket's field map
///
/// Integers may arrive as JSON numbers or as numeric strings. Absent, `null` and empty string
/// values all count as missing.
#[derive(Debug, Clone, Copy)]
pub struct TicketReader<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> TicketReader<'a> {
    pub fn new(fields: &'a Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Read the whole ticket and check action-specific requirements
    pub fn read_ticket(&self) -> TicketResult<ActionTicket> {
        let ticket = ActionTicket {
            task_id: self.read_mandatory_integer(fields::ID)?,
            action: self.read_action(fields::ACTION)?,
            correction_task_id: self.read_optional_integer(fields::CORRECTION_TASK_ID)?,
            message: self.read_optional_string(fields::MESSAGE)?,
            properties: self.read_optional_map_of_strings(fields::PROPERTIES)?,
        };
        ticket.validate()?;
        Ok(ticket)
    }

    pub fn read_mandatory_integer(&self, key: &str) -> TicketResult<i64> {
        self.read_optional_integer(key)?
            .ok_or_else(|| TicketError::missing_field(key))
    }

    pub fn read_mandatory_string(&self, key: &str) -> TicketResult<String> {
        self.read_optional_string(key)?
            .ok_or_else(|| TicketError::missing_field(key))
    }

    pub fn read_optional_integer(&self, key: &str) -> TicketResult<Option<i64>> {
        match self.present(key) {
            None => Ok(None),
            Some(value) => parse_integer(key, value).map(Some),
        }
    }

    pub fn read_optional_string(&self, key: &str) -> TicketResult<Option<String>> {
        match self.present(key) {
            None => Ok(None),
            Some(value) => scalar_to_string(key, value).map(Some),
        }
    }

    pub fn read_action(&self, key: &str) -> TicketResult<TaskAction> {
        let raw = self.read_mandatory_string(key)?;
        raw.parse()
            .map_err(|_| TicketError::unknown_action(raw.trim()))
    }

    /// Read a nested object of scalar values; absence yields an empty map
    pub fn read_optional_map_of_strings(
        &self,
        key: &str,
    ) -> TicketResult<BTreeMap<String, String>> {
        match self.present(key) {
            None => Ok(BTreeMap::new()),
            Some(Value::Object(entries)) => entries
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(name, value)| {
                    scalar_to_string(key, value).map(|text| (name.clone(), text))
                })
                .collect(),
            Some(_) => Err(TicketError::invalid_field(key, "expected an object")),
        }
    }

    /// Read a list of integers
    ///
    /// Arrays may mix numbers and strings. Every string, inside an array or on its own, is split
    /// on each run of non-digit characters, so `"1, 2;3"` yields `[1, 2, 3]`.
    pub fn read_collection_of_integer(&self, key: &str) -> TicketResult<Vec<i64>> {
        match self.present(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => {
                let mut numbers = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Null => {}
                        Value::String(text) => numbers.extend(split_integers(key, text)?),
                        other => numbers.push(parse_integer(key, other)?),
                    }
                }
                Ok(numbers)
            }
            Some(Value::String(text)) => split_integers(key, text),
            Some(value) => parse_integer(key, value).map(|n| vec![n]),
        }
    }

    /// Raw `id` value for outcome reports, whatever its type or validity
    pub fn raw_id(&self) -> Option<String> {
        match self.fields.get(fields::ID)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        match self.fields.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) if text.trim().is_empty() => None,
            Some(value) => Some(value),
        }
    }
}

fn parse_integer(key: &str, value: &Value) -> TicketResult<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| TicketError::invalid_field(key, format!("{number} is not an integer"))),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| TicketError::invalid_field(key, format!("'{text}' is not an integer"))),
        other => Err(TicketError::invalid_field(
            key,
            format!("expected an integer, got {}", json_type(other)),
        )),
    }
}

fn split_integers(key: &str, text: &str) -> TicketResult<Vec<i64>> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            piece
                .parse::<i64>()
                .map_err(|e| TicketError::invalid_field(key, e.to_string()))
        })
        .collect()
}

fn scalar_to_string(key: &str, value: &Value) -> TicketResult<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(TicketError::invalid_field(
            key,
            format!("expected a scalar, got {}", json_type(other)),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
