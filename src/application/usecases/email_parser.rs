use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::domain::value_objects::payment_fields::PaymentFields;

// Banregio SPEI notification emails render each field as a label followed by
// its value, e.g. "Cuenta origen *****8016 JUANA ELVIRA CHAPARRO LOYA".
// Labels are matched case-insensitively but the value classes stay
// case-sensitive, so uppercase-only captures keep their meaning.
static ACCOUNT_HTML_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<p[^>]*>([*\d]+)</p>\s*<p[^>]*>([A-ZÁÉÍÓÚÑ\s.,]+?)</p>").unwrap()
});
static TRACKING_HTML_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:Clave de rastreo)</p>\s*<p[^>]*>([A-Z0-9]+)</p>").unwrap());

static ACCOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:Cuenta origen)\s+([*\d]+)\s+([A-ZÁÉÍÓÚÑ\s]+?)(?:\s+(?i:Cuenta destino|Cantidad)|$)")
        .unwrap()
});
static TRACKING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:Clave de rastreo)\s+([A-Z0-9]+)").unwrap());
static CONCEPT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:Concepto de pago)\s+(\S+(?:\s+\S+)*?)(?:\s+(?i:Referencia)|$)").unwrap()
});
static REFERENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:Referencia)\s+(\d+)").unwrap());
static APPLIED_AT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:Fecha de aplicaci[oó]n)\s+(\d{2}/\d{2}/\d{4}\s+\d{2}:\d{2}:\d{2})").unwrap()
});
static INSTITUTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:Instituci[oó]n emisora)\s+(\S+(?:\s+\S+)*?)(?:\s+[A-Z][a-z]|$)").unwrap()
});
static AMOUNT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i:Cantidad)\s+\$([\d,]+\.\d{2})").unwrap());

// Looser fallbacks: Banregio tracking keys start with SPIN (SPEI) or MBAN
// (mobile banking); amounts always render as $1,234.56.
static SPIN_FALLBACK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(SPIN\w+)").unwrap());
static MBAN_FALLBACK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(MBAN\w+)").unwrap());
static AMOUNT_FALLBACK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([\d,]+\.\d{2})").unwrap());

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Extracts payment fields from a notification email body. Pure and
/// deterministic; malformed input yields a value with `None` fields rather
/// than an error. Extraction is layered: structural HTML patterns first for
/// the account/name pair and the tracking key, then prose patterns over the
/// normalized body for everything still missing, then the loose fallbacks.
pub fn parse(email_body: &str) -> PaymentFields {
    let mut fields = PaymentFields::default();

    if email_body.is_empty() {
        warn!("email parser: body is empty");
        return fields;
    }

    debug!(body_length = email_body.len(), "email parser: parsing body");

    extract_from_html(email_body, &mut fields);

    let normalized = normalize(email_body);

    if fields.source_account.is_none() {
        if let Some(captures) = ACCOUNT_PATTERN.captures(&normalized) {
            fields.source_account = capture_to_field(&captures, 1);
            fields.payer_name = capture_to_field(&captures, 2);
        }
    }

    if fields.tracking_key.is_none() {
        fields.tracking_key = capture_first(&normalized, &TRACKING_PATTERN, "tracking key");
    }

    fields.payment_concept = capture_first(&normalized, &CONCEPT_PATTERN, "payment concept");
    fields.reference = capture_first(&normalized, &REFERENCE_PATTERN, "reference");
    fields.applied_at = capture_first(&normalized, &APPLIED_AT_PATTERN, "application date");
    fields.issuing_institution =
        capture_first(&normalized, &INSTITUTION_PATTERN, "issuing institution");

    if let Some(raw_amount) = capture_first(&normalized, &AMOUNT_PATTERN, "amount") {
        fields.amount = Some(raw_amount.replace(',', ""));
    }

    apply_fallbacks(&normalized, &mut fields);

    debug!(
        tracking_key = ?fields.tracking_key,
        amount = ?fields.amount,
        "email parser: finished"
    );

    fields
}

/// Structural pass over the raw HTML. Positional `<p>` pairs are more
/// reliable than prose matching when the original markup is intact.
fn extract_from_html(html: &str, fields: &mut PaymentFields) {
    if let Some(captures) = ACCOUNT_HTML_PATTERN.captures(html) {
        fields.source_account = capture_to_field(&captures, 1);
        fields.payer_name = capture_to_field(&captures, 2);
        debug!(
            source_account = ?fields.source_account,
            payer_name = ?fields.payer_name,
            "email parser: account found in html"
        );
    }

    if let Some(captures) = TRACKING_HTML_PATTERN.captures(html) {
        fields.tracking_key = capture_to_field(&captures, 1);
        debug!(tracking_key = ?fields.tracking_key, "email parser: tracking key found in html");
    }
}

fn apply_fallbacks(normalized: &str, fields: &mut PaymentFields) {
    if fields.tracking_key.is_none() {
        debug!("email parser: primary tracking key pattern failed, trying fallbacks");
        fields.tracking_key = capture_first(normalized, &SPIN_FALLBACK_PATTERN, "spin code")
            .or_else(|| capture_first(normalized, &MBAN_FALLBACK_PATTERN, "mban code"));
    }

    if fields.amount.is_none() {
        if let Some(raw_amount) =
            capture_first(normalized, &AMOUNT_FALLBACK_PATTERN, "amount fallback")
        {
            fields.amount = Some(raw_amount.replace(',', ""));
        }
    }
}

/// Strips markup, unescapes the entities Banregio emails actually use, and
/// collapses all whitespace into single spaces.
fn normalize(html: &str) -> String {
    let without_tags = TAG_PATTERN.replace_all(html, " ");
    let unescaped = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">");

    WHITESPACE_PATTERN
        .replace_all(&unescaped, " ")
        .trim()
        .to_string()
}

fn capture_first(text: &str, pattern: &Regex, field_name: &str) -> Option<String> {
    match pattern.captures(text).and_then(|c| capture_to_field(&c, 1)) {
        Some(value) => {
            debug!(field = field_name, value = %value, "email parser: field found");
            Some(value)
        }
        None => {
            debug!(field = field_name, "email parser: field not found");
            None
        }
    }
}

fn capture_to_field(captures: &regex::Captures<'_>, index: usize) -> Option<String> {
    captures
        .get(index)
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}
