use serde_json::Value;
use std::borrow::Cow;

static NULL: Value = Value::Null;

/// Sectioned CSV laid out the way the reports read in a spreadsheet: a title
/// row per section, then key/value pairs or a header row and data rows.
#[derive(Default)]
pub(super) struct Sheet {
    out: String,
}

impl Sheet {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn section(&mut self, title: &str) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.row([title]);
    }

    pub(super) fn kv(&mut self, key: &str, value: impl AsRef<str>) {
        self.row([key, value.as_ref()]);
    }

    pub(super) fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let line: Vec<String> = cells
            .into_iter()
            .map(|cell| csv_field(cell.as_ref()).into_owned())
            .collect();
        self.out.push_str(&line.join(","));
        self.out.push('\n');
    }

    pub(super) fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }
}

fn csv_field(text: &str) -> Cow<'_, str> {
    if text.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", text.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(text)
    }
}

/// `value[key]`, or null.
pub(super) fn field<'a>(value: &'a Value, key: &str) -> &'a Value {
    value.get(key).unwrap_or(&NULL)
}

pub(super) fn items(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Plain cell text: strings as-is, lists joined, null empty.
pub(super) fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(list) => list.iter().map(cell).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Whole dollars with thousands separators, e.g. `$850,000`.
pub(super) fn money(value: &Value) -> String {
    match value.as_f64() {
        Some(amount) => {
            let rounded = amount.round();
            let sign = if rounded < 0.0 { "-" } else { "" };
            format!("{sign}${}", group_thousands(rounded.abs() as u64))
        }
        None => cell(value),
    }
}

/// A ratio such as `0.35` as `35%`.
pub(super) fn ratio_percent(value: &Value) -> String {
    match value.as_f64() {
        Some(ratio) => format!("{:.0}%", ratio * 100.0),
        None => cell(value),
    }
}

/// An already-scaled percentage such as `12.3` as `12.3%`.
pub(super) fn percent(value: &Value) -> String {
    match value.as_f64() {
        Some(pct) => format!("{pct:.1}%"),
        None => cell(value),
    }
}

fn group_thousands(mut n: u64) -> String {
    let mut groups = Vec::new();
    loop {
        if n < 1000 {
            groups.push(n.to_string());
            break;
        }
        groups.push(format!("{:03}", n % 1000));
        n /= 1000;
    }
    groups.reverse();
    groups.join(",")
}

/// Lowercase file-name stem for a free-text label.
pub(super) fn file_stem(label: &str) -> String {
    let stem: String = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem.trim_matches('_').is_empty() {
        "unknown".to_string()
    } else {
        stem
    }
}
