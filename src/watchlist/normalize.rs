//! MRZ-style normalization of watch-list attributes.
//!
//! Every attribute ends up as a fixed-width array of ASCII codes using `<`
//! as filler, the same shape the passport circuit reads from the MRZ.

use chrono::NaiveDate;

/// Width of the `LAST<<FIRST` name field.
pub const NAME_LENGTH: usize = 39;

/// Names are hashed in three chunks of this size.
pub const NAME_CHUNK: usize = 13;

pub const PASSPORT_NUMBER_LENGTH: usize = 9;
pub const NATIONALITY_LENGTH: usize = 3;

const FILLER: u8 = b'<';

/// Upper-case a name part for the MRZ alphabet.
///
/// Apostrophes and periods are dropped, spaces and hyphens become `<`,
/// anything else outside `A-Z` is removed.
pub fn normalize_name_part(part: &str) -> String {
    part.trim()
        .chars()
        .filter_map(|c| match c.to_ascii_uppercase() {
            '\'' | '.' => None,
            ' ' | '-' => Some('<'),
            c @ 'A'..='Z' => Some(c),
            _ => None,
        })
        .collect()
}

/// `LAST<<FIRST`, filled with `<` or cut to [`NAME_LENGTH`].
///
/// Returns `None` when no letters survive normalization.
pub fn mrz_name(first_name: &str, last_name: &str) -> Option<[u8; NAME_LENGTH]> {
    let first = normalize_name_part(first_name);
    let last = normalize_name_part(last_name);
    if !first.bytes().chain(last.bytes()).any(|b| b != FILLER) {
        return None;
    }

    let joined = format!("{last}<<{first}");
    Some(fixed_width(joined.as_bytes()))
}

fn fixed_width<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [FILLER; N];
    for (slot, byte) in out.iter_mut().zip(bytes) {
        *slot = *byte;
    }
    out
}

/// Parse a calendar date given as day, month and a four-digit year.
pub fn parse_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day = day.trim().parse().ok()?;
    let month = month.trim().parse().ok()?;
    let year = year.trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse `YYYY-MM-DD` or `DD/MM/YYYY`.
pub fn parse_date_str(date: &str) -> Option<NaiveDate> {
    let date = date.trim();
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%d/%m/%Y"))
        .ok()
}

/// `YYMMDD` as ASCII codes.
pub fn mrz_dob(date: NaiveDate) -> [u8; 6] {
    let mut out = [0u8; 6];
    out.copy_from_slice(date.format("%y%m%d").to_string().as_bytes());
    out
}

/// Last two digits of a year as ASCII codes.
pub fn mrz_year(year: i32) -> [u8; 2] {
    let yy = year.rem_euclid(100) as u8;
    [b'0' + yy / 10, b'0' + yy % 10]
}

/// Passport number filled to nine characters followed by the nationality.
///
/// Returns `None` for an empty number, a number longer than nine
/// characters, or a nationality that is not three letters.
pub fn mrz_passport(number: &str, nationality: &str) -> Option<[u8; 12]> {
    let number: String = number
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let nationality = nationality.trim().to_ascii_uppercase();
    if number.is_empty()
        || number.len() > PASSPORT_NUMBER_LENGTH
        || nationality.len() != NATIONALITY_LENGTH
        || !nationality.bytes().all(|b| b.is_ascii_uppercase())
    {
        return None;
    }

    let mut out = [FILLER; PASSPORT_NUMBER_LENGTH + NATIONALITY_LENGTH];
    out[..number.len()].copy_from_slice(number.as_bytes());
    out[PASSPORT_NUMBER_LENGTH..].copy_from_slice(nationality.as_bytes());
    Some(out)
}
