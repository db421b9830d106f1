// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile normalization.
//!
//! Turns a provider-native attribute bag into a canonical [`Profile`].
//! Parsing is lenient: a malformed optional value never fails the call.
//! Gender falls back to `X`, birthdays fall back to the raw string.

use crate::error::{AppError, Result};
use crate::models::{
    Birthday, CanonicalField, FieldMap, Gender, Group, Profile, ProviderFlavor, RawAttributes,
};
use chrono::NaiveDate;
use serde_json::Value;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Build a canonical profile from a raw attribute bag.
///
/// `id` and `displayName` are required; every other field is optional.
pub fn normalize(flavor: ProviderFlavor, fields: &FieldMap, raw: &RawAttributes) -> Result<Profile> {
    let get = |field: CanonicalField| raw.get(fields.native(field)).filter(|v| !v.is_null());

    let id = get(CanonicalField::Id)
        .and_then(scalar_to_string)
        .ok_or_else(|| AppError::MissingRequiredField(CanonicalField::Id.as_str().to_string()))?;

    let display_name = get(CanonicalField::DisplayName)
        .and_then(display_name_value)
        .ok_or_else(|| {
            AppError::MissingRequiredField(CanonicalField::DisplayName.as_str().to_string())
        })?;

    let (given_name, family_name) = split_display_name(&display_name);

    Ok(Profile {
        id,
        given_name: given_name.to_string(),
        family_name: family_name.to_string(),
        display_name,
        profile_url: get(CanonicalField::ProfileUrl).and_then(scalar_to_string),
        birthday: parse_birthday(flavor, get(CanonicalField::Birthday).and_then(Value::as_str)),
        gender: parse_gender(flavor, get(CanonicalField::Gender).and_then(Value::as_str)),
        about_me: get(CanonicalField::AboutMe).and_then(scalar_to_string),
        emails: get(CanonicalField::Emails).cloned(),
        address: get(CanonicalField::Address).cloned(),
        photo: get(CanonicalField::Photo).and_then(scalar_to_string),
        work_history: get(CanonicalField::WorkHistory).cloned(),
    })
}

/// Normalize every record, failing on the first malformed one.
pub fn normalize_all(
    flavor: ProviderFlavor,
    fields: &FieldMap,
    records: &[RawAttributes],
) -> Result<Vec<Profile>> {
    records
        .iter()
        .map(|raw| normalize(flavor, fields, raw))
        .collect()
}

/// Build a canonical group from a provider-native record.
pub fn normalize_group(flavor: ProviderFlavor, raw: RawAttributes) -> Result<Group> {
    let (id_key, name_key) = match flavor {
        ProviderFlavor::TokenSession => ("gid", "name"),
        ProviderFlavor::OAuth => ("id", "title"),
    };

    let id = raw
        .get(id_key)
        .and_then(scalar_to_string)
        .ok_or_else(|| AppError::MissingRequiredField(format!("group.{}", id_key)))?;
    let name = raw.get(name_key).and_then(scalar_to_string);

    Ok(Group {
        id,
        name,
        attributes: raw,
    })
}

/// Split a display name on the first space.
///
/// The first token is the given name and the remainder the family name.
/// Without a space the family name is empty.
pub fn split_display_name(display_name: &str) -> (&str, &str) {
    display_name.split_once(' ').unwrap_or((display_name, ""))
}

/// Parse a provider gender value into `M`, `F` or `X`.
///
/// Token-session providers must send exactly `male`/`female`; OAuth providers
/// are matched case-insensitively.
pub fn parse_gender(flavor: ProviderFlavor, raw: Option<&str>) -> Gender {
    let Some(raw) = raw else {
        return Gender::X;
    };

    let is = |expected: &str| match flavor {
        ProviderFlavor::TokenSession => raw == expected,
        ProviderFlavor::OAuth => raw.eq_ignore_ascii_case(expected),
    };

    if is("male") {
        Gender::M
    } else if is("female") {
        Gender::F
    } else {
        Gender::X
    }
}

/// Parse a provider birthday.
///
/// Token-session format is `Month D, YYYY`; OAuth format is `YYYY-MM-DD`
/// with any trailing content ignored. Anything else is returned unparsed.
pub fn parse_birthday(flavor: ProviderFlavor, raw: Option<&str>) -> Option<Birthday> {
    let raw = raw?;
    let parsed = match flavor {
        ProviderFlavor::TokenSession => parse_month_day_year(raw),
        ProviderFlavor::OAuth => parse_iso_prefix(raw),
    };

    Some(match parsed {
        Some(date) => Birthday::Date(date),
        None => Birthday::Raw(raw.to_string()),
    })
}

/// `January 1, 1970`
fn parse_month_day_year(raw: &str) -> Option<NaiveDate> {
    let (month, rest) = raw.split_once(' ')?;
    let (day, year) = rest.split_once(", ")?;

    let month = MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month))? as u32
        + 1;

    if day.is_empty() || day.len() > 2 || !day.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

/// `1970-01-01`, optionally followed by anything (e.g. a time component).
fn parse_iso_prefix(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(..10)?;
    let bytes = prefix.as_bytes();
    let shape_ok = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !shape_ok {
        return None;
    }

    NaiveDate::from_ymd_opt(
        prefix[0..4].parse().ok()?,
        prefix[5..7].parse().ok()?,
        prefix[8..10].parse().ok()?,
    )
}

/// Providers send ids as numbers or strings; everything else scalar becomes text.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// OAuth providers may send `displayName` as a plain string or as a name object.
fn display_name_value(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get("formatted")
            .or_else(|| map.get("displayName"))
            .and_then(Value::as_str)
            .map(str::to_string),
        other => scalar_to_string(other),
    }
}
