//! Comparable sales from a spreadsheet export (CSV).
//!
//! Column headers are matched loosely: `Sale Price`, `price` and `Sold For`
//! all land in `sold_price`. Rows without an address are skipped.
use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

#[derive(Clone, Copy)]
enum Cell {
    Text,
    Int,
    Float,
}

/// Comp field, cell type, header aliases. The field name itself also matches.
const FIELDS: &[(&str, Cell, &[&str])] = &[
    (
        "address",
        Cell::Text,
        &["address", "property", "location", "street", "property_address"],
    ),
    (
        "sold_price",
        Cell::Int,
        &["sold_price", "price", "sale_price", "sold", "amount", "sale_amount", "sold_for"],
    ),
    (
        "sold_date",
        Cell::Text,
        &["sold_date", "date", "sale_date", "settlement", "settlement_date", "date_sold"],
    ),
    ("beds", Cell::Int, &["beds", "bedrooms", "bed", "br", "bedroom"]),
    ("baths", Cell::Int, &["baths", "bathrooms", "bath", "bathroom"]),
    (
        "cars",
        Cell::Int,
        &["cars", "car_spaces", "car", "parking", "garage", "carspace"],
    ),
    (
        "land_sqm",
        Cell::Float,
        &["land_sqm", "land", "land_area", "land_size", "lot_size", "sqm", "area"],
    ),
    (
        "building_sqm",
        Cell::Float,
        &["building_sqm", "building", "building_area", "floor_area", "internal", "house_size"],
    ),
    (
        "property_type",
        Cell::Text,
        &["property_type", "type", "prop_type", "dwelling"],
    ),
    (
        "condition_notes",
        Cell::Text,
        &["condition", "condition_notes", "notes", "comments", "state", "quality"],
    ),
    (
        "distance_km",
        Cell::Float,
        &["distance", "distance_km", "km", "dist"],
    ),
];

/// Parse CSV bytes into comp objects. Text that is not UTF-8 is read as
/// Latin-1.
pub fn comps_from_csv(bytes: &[u8]) -> Result<Vec<Value>> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let mut rows = parse_rows(text)
        .into_iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()));
    let header = rows
        .next()
        .ok_or_else(|| anyhow!("no data found in spreadsheet"))?;
    let columns: Vec<String> = header.iter().map(|name| clean_header(name)).collect();
    let mapping: Vec<(usize, &str, Cell)> = FIELDS
        .iter()
        .filter_map(|(field, cell, aliases)| {
            best_match(field, aliases, &columns).map(|index| (index, *field, *cell))
        })
        .collect();

    let mut comps = Vec::new();
    for row in rows {
        let mut comp = Map::new();
        for &(index, field, cell) in &mapping {
            let raw = row.get(index).map(|s| s.trim()).unwrap_or("");
            let value = match cell {
                Cell::Text if raw.is_empty() => continue,
                Cell::Text => json!(raw),
                Cell::Int => to_number(raw).map_or(Value::Null, |n| json!(n.trunc() as i64)),
                Cell::Float => to_number(raw).map_or(Value::Null, |n| json!(n)),
            };
            comp.insert(field.to_string(), value);
        }
        let has_address = comp
            .get("address")
            .and_then(Value::as_str)
            .is_some_and(|address| !address.is_empty());
        if !has_address {
            continue;
        }
        comp.entry("property_type").or_insert_with(|| json!("house"));
        comps.push(Value::Object(comp));
    }
    if comps.is_empty() {
        return Err(anyhow!("no data found in spreadsheet"));
    }
    Ok(comps)
}

/// `" Sale Price ($) "` becomes `sale_price`.
fn clean_header(name: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^\w\s]").expect("static header regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("static header regex"));
    let lowered = name.trim().to_lowercase();
    let stripped = non_word.replace_all(&lowered, "");
    spaces.replace_all(stripped.trim(), "_").into_owned()
}

/// Exact match on the field or an alias first, then a substring match either
/// way for aliases of four or more characters.
fn best_match(field: &str, aliases: &[&str], columns: &[String]) -> Option<usize> {
    let names = || std::iter::once(field).chain(aliases.iter().copied());
    if let Some(index) = columns
        .iter()
        .position(|column| names().any(|name| column == name))
    {
        return Some(index);
    }
    columns.iter().position(|column| {
        !column.is_empty()
            && aliases
                .iter()
                .filter(|alias| alias.len() >= 4)
                .any(|alias| column.contains(alias) || alias.contains(column.as_str()))
    })
}

fn to_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%') && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// RFC 4180 rows: quoted cells may hold commas, doubled quotes and newlines.
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => quoted = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' if cell.is_empty() => quoted = true,
            ',' => row.push(std::mem::take(&mut cell)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(c),
        }
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }
    rows
}
