//! Turns [`ParsedFields`] into a [`ListingRecord`] or a [`ValidationError`]
//! naming every field that failed.

use chrono::NaiveDate;
use url::Url;

use crate::error::{Field, FieldFailure, ValidationError};
use crate::models::{ListingRecord, ParsedFields};
use crate::scrapers::parse::{parse_distance, parse_posted_at};

/// Validate a candidate listing
///
/// The returned record carries no image data; images are attached after
/// validation so rejected candidates never trigger a fetch.
pub fn validate(fields: &ParsedFields, today: NaiveDate) -> Result<ListingRecord, ValidationError> {
    let mut failures = Vec::new();

    let title = required(fields.title.as_deref(), Field::Title, &mut failures);

    let link = match required(fields.link.as_deref(), Field::Link, &mut failures) {
        Some(link) if Url::parse(&link).is_err() => {
            failures.push(FieldFailure::new(Field::Link, format!("`{}` is not an absolute URL", link)));
            None
        }
        other => other,
    };

    let location = required(Some(fields.location.as_str()), Field::Location, &mut failures);

    let distance_km = match parse_distance(&fields.distance) {
        Ok(km) if km < 0.0 => {
            failures.push(FieldFailure::new(Field::Distance, format!("{} km is negative", km)));
            None
        }
        Ok(km) => Some(km),
        Err(e) => {
            failures.push(FieldFailure::new(Field::Distance, e));
            None
        }
    };

    let posted_at = match fields.posted_at.as_deref() {
        Some(text) => match parse_posted_at(text, today) {
            Ok(at) => Some(at),
            Err(e) => {
                failures.push(FieldFailure::new(Field::PostedAt, e));
                None
            }
        },
        None => {
            failures.push(FieldFailure::new(Field::PostedAt, "missing"));
            None
        }
    };

    match (title, link, location, distance_km, posted_at) {
        (Some(title), Some(link), Some(location), Some(distance_km), Some(posted_at))
            if failures.is_empty() =>
        {
            Ok(ListingRecord {
                title,
                location,
                distance_km,
                posted_at,
                image_data: None,
                link,
            })
        }
        _ => Err(ValidationError { failures }),
    }
}

fn required(value: Option<&str>, field: Field, failures: &mut Vec<FieldFailure>) -> Option<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        Some(_) => {
            failures.push(FieldFailure::new(field, "empty"));
            None
        }
        None => {
            failures.push(FieldFailure::new(field, "missing"));
            None
        }
    }
}
