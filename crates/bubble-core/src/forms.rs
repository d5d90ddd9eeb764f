//! Lead-capture and appointment forms opened by action directives.
//!
//! The forms hold user input for the fields the bot asked for and build the
//! JSON bodies the backend expects. Checking the values themselves is left to
//! the host UI and the backend. Network calls live in
//! [`crate::client::WidgetClient`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::action::FieldSpec;

/// Shown in the chat after a lead was submitted.
pub const LEAD_SUCCESS_MESSAGE: &str =
    "Thank you! Your details were sent successfully. We will contact you soon.";

/// Shown in the chat after an appointment was booked.
pub const APPOINTMENT_SUCCESS_MESSAGE: &str =
    "Your appointment was booked successfully! You will receive a confirmation email shortly.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// The value was set for a field the form does not have.
    UnknownField(String),
    /// The appointment date is not `YYYY-MM-DD`.
    InvalidDate { value: String, reason: String },
    /// No appointment date chosen yet.
    NoDateSelected,
    /// No time slot chosen yet.
    NoSlotSelected,
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::UnknownField(name) => write!(f, "Unknown field '{name}'"),
            FormError::InvalidDate { value, reason } => {
                write!(f, "Invalid date '{value}' ({reason}), expected YYYY-MM-DD")
            }
            FormError::NoDateSelected => write!(f, "Please choose a date."),
            FormError::NoSlotSelected => write!(f, "Please choose an appointment time."),
        }
    }
}

impl std::error::Error for FormError {}

/// Field values keyed by field name.
///
/// Submissions list the values in key order, not the order the form declares.
#[derive(Debug, Clone)]
struct FieldValues {
    fields: Vec<FieldSpec>,
    values: BTreeMap<String, String>,
}

impl FieldValues {
    fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            values: BTreeMap::new(),
        }
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        if !self.fields.iter().any(|field| field.name == name) {
            return Err(FormError::UnknownField(name.to_string()));
        }
        self.values.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Trimmed values for every field; fields never set are sent empty.
    fn trimmed(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|field| {
                let value = self.values.get(&field.name).map_or("", |v| v.trim());
                (field.name.clone(), value.to_string())
            })
            .collect()
    }
}

/// Body of `POST /submit-lead`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSubmission {
    #[serde(rename = "leadData")]
    pub lead_data: BTreeMap<String, String>,
    /// RFC 3339 submission time.
    pub timestamp: String,
}

/// Lead-capture form.
#[derive(Debug, Clone)]
pub struct LeadForm {
    inner: FieldValues,
    reason: Option<String>,
}

impl LeadForm {
    pub fn new(fields: Vec<FieldSpec>, reason: Option<String>) -> Self {
        Self {
            inner: FieldValues::new(fields),
            reason,
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.inner.fields
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        self.inner.set(name, value)
    }

    /// Builds the submission body stamped with `now`.
    pub fn submission(&self, now: DateTime<Utc>) -> LeadSubmission {
        LeadSubmission {
            lead_data: self.inner.trimmed(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// A bookable slot returned by `GET /available-slots/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Local ISO datetime sent back as `start_datetime`.
    pub datetime: String,
    pub start_time: String,
    pub end_time: String,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start_time, self.end_time)
    }
}

/// Appointment-booking form: contact fields, a date, and a slot on that date.
#[derive(Debug, Clone)]
pub struct AppointmentForm {
    inner: FieldValues,
    reason: Option<String>,
    date: Option<NaiveDate>,
    slot: Option<Slot>,
}

impl AppointmentForm {
    pub fn new(fields: Vec<FieldSpec>, reason: Option<String>) -> Self {
        Self {
            inner: FieldValues::new(fields),
            reason,
            date: None,
            slot: None,
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.inner.fields
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        self.inner.set(name, value)
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// Parses and sets the appointment date. Changing the date drops the
    /// selected slot.
    pub fn set_date(&mut self, value: &str) -> Result<NaiveDate, FormError> {
        let value = value.trim();
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|err| FormError::InvalidDate {
                value: value.to_string(),
                reason: err.to_string(),
            })?;
        if self.date != Some(date) {
            self.slot = None;
        }
        self.date = Some(date);
        Ok(date)
    }

    pub fn select_slot(&mut self, slot: Slot) {
        self.slot = Some(slot);
    }

    pub fn slot(&self) -> Option<&Slot> {
        self.slot.as_ref()
    }

    /// Builds the `POST /create-appointment` body: the field values plus
    /// `appointment_date` and `start_datetime`.
    pub fn submission(&self) -> Result<serde_json::Map<String, serde_json::Value>, FormError> {
        let values = self.inner.trimmed();
        let date = self.date.ok_or(FormError::NoDateSelected)?;
        let slot = self.slot.as_ref().ok_or(FormError::NoSlotSelected)?;

        let mut body: serde_json::Map<String, serde_json::Value> = values
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        body.insert(
            "appointment_date".to_string(),
            date.format("%Y-%m-%d").to_string().into(),
        );
        body.insert("start_datetime".to_string(), slot.datetime.clone().into());
        Ok(body)
    }
}
