//! Field extraction and normalization for a single Kleinanzeigen listing.
//!
//! Every function here is pure: markup or text in, owned values out. Failures
//! are reported as [`ParseError`] and never replaced by placeholder values.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use scraper::{ElementRef, Selector};
use url::Url;

use crate::error::ParseError;
use crate::models::ParsedFields;

/// Base URL relative listing links are resolved against
pub const SITE_BASE_URL: &str = "https://www.kleinanzeigen.de/";

/// Distance string used when the location carries no distance suffix
pub const ZERO_DISTANCE: &str = "0 km";

const DISTANCE_PREFIX: &str = "ca.";
const DISTANCE_UNIT: &str = "km";
const TODAY_MARKER: &str = "Heute";
const YESTERDAY_MARKER: &str = "Gestern";
const UNKNOWN_LOCATION: &str = "Unknown";

/// CSS selectors for the parts of a listing fragment
pub struct FragmentSelectors {
    title_span: Selector,
    title_anchor: Selector,
    location: Selector,
    posted_at: Selector,
    image: Selector,
}

impl FragmentSelectors {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title_span: selector("span.ellipsis")?,
            title_anchor: selector("a.ellipsis")?,
            location: selector("div.aditem-main--top--left")?,
            posted_at: selector("div.aditem-main--top--right")?,
            image: selector("img")?,
        })
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {:?}", css, e))
}

/// Pull the raw fields out of a metadata fragment and its paired image fragment
pub fn parse_fragment(
    main: ElementRef<'_>,
    image: ElementRef<'_>,
    selectors: &FragmentSelectors,
    base: &Url,
) -> ParsedFields {
    let (title, link) = extract_title_link(main, selectors, base);

    let (location, distance) = match main.select(&selectors.location).next() {
        Some(el) => split_location(&element_text(el)),
        None => (UNKNOWN_LOCATION.to_string(), ZERO_DISTANCE.to_string()),
    };

    let posted_at = main
        .select(&selectors.posted_at)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty());

    let image_url = image
        .select(&selectors.image)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(String::from);

    ParsedFields {
        title,
        link,
        location,
        distance,
        posted_at,
        image_url,
    }
}

/// Title and absolute link, trying the `span` shape before the `a` shape
pub fn extract_title_link(
    main: ElementRef<'_>,
    selectors: &FragmentSelectors,
    base: &Url,
) -> (Option<String>, Option<String>) {
    let shapes = [
        (&selectors.title_span, "data-url"),
        (&selectors.title_anchor, "href"),
    ];

    for (shape, link_attr) in shapes {
        let Some(el) = main.select(shape).next() else {
            continue;
        };
        let title = element_text(el);
        if title.is_empty() {
            continue;
        }
        let link = el
            .value()
            .attr(link_attr)
            .and_then(|raw| resolve_link(raw, base));
        return (Some(title), link);
    }

    (None, None)
}

/// Resolve a possibly relative link against the site base URL
///
/// Absolute links are returned unchanged; empty links resolve to nothing.
pub fn resolve_link(raw: &str, base: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if Url::parse(raw).is_ok() {
        return Some(raw.to_string());
    }
    base.join(raw).ok().map(String::from)
}

/// Split `"86150 Augsburg (3 km)"` into location and distance string
pub fn split_location(text: &str) -> (String, String) {
    match text.split_once('(') {
        Some((location, distance)) => (
            location.trim().to_string(),
            distance.replace(')', "").trim().to_string(),
        ),
        None => (text.trim().to_string(), ZERO_DISTANCE.to_string()),
    }
}

/// Parse `"ca. 3,4 km"` or `"3.4 km"` into kilometres
pub fn parse_distance(text: &str) -> Result<f64, ParseError> {
    let trimmed = text.trim();
    let without_prefix = trimmed.strip_prefix(DISTANCE_PREFIX).unwrap_or(trimmed);
    let without_unit = without_prefix
        .trim()
        .strip_suffix(DISTANCE_UNIT)
        .unwrap_or(without_prefix);
    let number = without_unit.trim().replace(',', ".");

    match number.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::InvalidDistance(text.to_string())),
    }
}

/// Resolve a posting date to UTC
///
/// `"Heute, HH:MM"` and `"Gestern, HH:MM"` are relative to `today`; anything
/// else must be a strict `DD.MM.YYYY` date.
pub fn parse_posted_at(text: &str, today: NaiveDate) -> Result<DateTime<Utc>, ParseError> {
    let text = text.trim();

    let relative_day = if text.contains(TODAY_MARKER) {
        Some(today)
    } else if text.contains(YESTERDAY_MARKER) {
        Some(today - Duration::days(1))
    } else {
        None
    };

    if let Some(day) = relative_day {
        let time = text
            .split_once(',')
            .and_then(|(_, time)| NaiveTime::parse_from_str(time.trim(), "%H:%M").ok())
            .ok_or_else(|| ParseError::InvalidTime(text.to_string()))?;
        return Ok(day.and_time(time).and_utc());
    }

    NaiveDate::parse_from_str(text, "%d.%m.%Y")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| ParseError::UnresolvableDate(text.to_string()))
}

/// Text content with each text node trimmed and joined without separators
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn base() -> Url {
        Url::parse(SITE_BASE_URL).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn parse_main(html: &str) -> ParsedFields {
        let doc = Html::parse_fragment(html);
        let image_doc = Html::parse_fragment("<div class=\"aditem-image\"></div>");
        let selectors = FragmentSelectors::new().unwrap();
        parse_fragment(
            doc.root_element(),
            image_doc.root_element(),
            &selectors,
            &base(),
        )
    }

    #[test]
    fn today_resolves_against_current_date() {
        let parsed = parse_posted_at("Heute, 14:30", today()).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-05T14:30:00+00:00");
    }

    #[test]
    fn yesterday_resolves_to_previous_day() {
        let parsed = parse_posted_at("Gestern, 09:00", today()).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-04T09:00:00+00:00");
    }

    #[test]
    fn yesterday_crosses_month_boundary() {
        let first = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let parsed = parse_posted_at("Gestern, 23:59", first).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-02-29T23:59:00+00:00");
    }

    #[test]
    fn absolute_date_is_midnight_utc() {
        let parsed = parse_posted_at("01.02.2023", today()).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2023-02-01T00:00:00+00:00");
    }

    #[test]
    fn unresolvable_dates_fail() {
        assert_eq!(
            parse_posted_at("garbage", today()),
            Err(ParseError::UnresolvableDate("garbage".into()))
        );
        assert!(parse_posted_at("2023-02-01", today()).is_err());
        assert_eq!(
            parse_posted_at("Heute", today()),
            Err(ParseError::InvalidTime("Heute".into()))
        );
        assert!(parse_posted_at("Heute, 25:00", today()).is_err());
    }

    #[test]
    fn distance_accepts_comma_and_dot() {
        assert_eq!(parse_distance("ca. 3,4 km").unwrap(), 3.4);
        assert_eq!(parse_distance("ca. 3.4 km").unwrap(), 3.4);
        assert_eq!(parse_distance("12 km").unwrap(), 12.0);
        assert_eq!(parse_distance(ZERO_DISTANCE).unwrap(), 0.0);
    }

    #[test]
    fn non_numeric_distance_is_an_error() {
        assert_eq!(
            parse_distance("ca. weit km"),
            Err(ParseError::InvalidDistance("ca. weit km".into()))
        );
        assert!(parse_distance("").is_err());
        assert!(parse_distance("inf km").is_err());
    }

    #[test]
    fn location_split_on_parenthesis() {
        assert_eq!(
            split_location("86150 Augsburg (ca. 3 km)"),
            ("86150 Augsburg".to_string(), "ca. 3 km".to_string())
        );
        assert_eq!(
            split_location("86150 Augsburg"),
            ("86150 Augsburg".to_string(), ZERO_DISTANCE.to_string())
        );
    }

    #[test]
    fn relative_links_resolve_against_site() {
        assert_eq!(
            resolve_link("/s-anzeige/123", &base()).as_deref(),
            Some("https://www.kleinanzeigen.de/s-anzeige/123")
        );
        assert_eq!(
            resolve_link("https://example.org/s-anzeige/9", &base()).as_deref(),
            Some("https://example.org/s-anzeige/9")
        );
        assert_eq!(resolve_link("  ", &base()), None);
    }

    #[test]
    fn span_shape_wins_over_anchor() {
        let fields = parse_main(
            r#"<div class="aditem-main">
                 <span class="ellipsis" data-url="/s-anzeige/1">Span title</span>
                 <a class="ellipsis" href="/s-anzeige/2">Anchor title</a>
               </div>"#,
        );
        assert_eq!(fields.title.as_deref(), Some("Span title"));
        assert_eq!(
            fields.link.as_deref(),
            Some("https://www.kleinanzeigen.de/s-anzeige/1")
        );
    }

    #[test]
    fn anchor_shape_used_when_span_is_empty() {
        let fields = parse_main(
            r#"<div class="aditem-main">
                 <span class="ellipsis" data-url="/s-anzeige/1">  </span>
                 <a class="ellipsis" href="/s-anzeige/2">Anchor title</a>
               </div>"#,
        );
        assert_eq!(fields.title.as_deref(), Some("Anchor title"));
        assert_eq!(
            fields.link.as_deref(),
            Some("https://www.kleinanzeigen.de/s-anzeige/2")
        );
    }

    #[test]
    fn missing_location_and_date() {
        let fields = parse_main(r#"<a class="ellipsis" href="/s-anzeige/3">Flat</a>"#);
        assert_eq!(fields.location, "Unknown");
        assert_eq!(fields.distance, ZERO_DISTANCE);
        assert_eq!(fields.posted_at, None);
        assert_eq!(fields.image_url, None);
    }
}
