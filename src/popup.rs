use crate::grants::NormalizedGrant;

const NEH_QUERY_BASE: &str = "https://securegrants.neh.gov/publicquery/main.aspx?f=1&AppNumber=";

/// Formats an award amount with en-US currency conventions: leading dollar
/// sign, thousands separators, two decimal places. `50000.0` renders as
/// `"$50,000.00"`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_usd(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let dollars = group_thousands(cents / 100);
    let fraction = cents % 100;
    if negative {
        format!("-${dollars}.{fraction:02}")
    } else {
        format!("${dollars}.{fraction:02}")
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Builds the popup markup for one normalized grant. Attribute values are
/// HTML-escaped before interpolation; the lookup link carries the
/// application number as a percent-encoded query value.
#[must_use]
pub fn build_popup_html(grant: &NormalizedGrant) -> String {
    let lookup_url = format!(
        "{NEH_QUERY_BASE}{}",
        percent_encode_query(&grant.app_number)
    );

    let mut html = String::with_capacity(512);
    html.push_str("<p>");
    html.push_str(&format!(
        "In {}, {} (in {}, {}) was awarded {} for <a href=\"{}\">NEH project number {}</a>.",
        grant.year_awarded,
        escape_html(&grant.institution),
        escape_html(&grant.inst_city),
        escape_html(&grant.inst_state),
        format_usd(grant.award_outright),
        escape_html(&lookup_url),
        escape_html(&grant.app_number)
    ));
    html.push_str("<br /><br />");
    html.push_str(&format!(
        "<strong>Project Title:</strong> {}<br />",
        escape_html(&grant.project_title)
    ));
    html.push_str(&format!(
        "<strong>Project participants:</strong> {}<br />",
        escape_html(&grant.participants)
    ));
    html.push_str(&format!(
        "<strong>NEH Program:</strong> {}<br />",
        escape_html(&grant.program)
    ));
    html.push_str(&format!(
        "<strong>NEH Division:</strong> {}",
        escape_html(&grant.division)
    ));
    html.push_str("</p>");
    html
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn percent_encode_query(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grants::{Grant, GrantProperties};

    fn defaulted_grant() -> NormalizedGrant {
        Grant {
            lon: -87.62,
            lat: 41.88,
            properties: GrantProperties {
                year_awarded: 1967,
                institution: None,
                inst_city: "Chicago".to_string(),
                inst_state: "IL".to_string(),
                award_outright: 12000.0,
                app_number: "AB-1234".to_string(),
                project_title: None,
                participants: None,
                program: "Research".to_string(),
                division: "Humanities".to_string(),
            },
        }
        .normalize()
    }

    #[test]
    fn formats_whole_dollar_amounts() {
        assert_eq!(format_usd(50000.0), "$50,000.00");
        assert_eq!(format_usd(12000.0), "$12,000.00");
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(999.0), "$999.00");
    }

    #[test]
    fn formats_fractional_and_large_amounts() {
        assert_eq!(format_usd(999.5), "$999.50");
        assert_eq!(format_usd(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_usd(-1500.25), "-$1,500.25");
    }

    #[test]
    fn popup_contains_required_substrings() {
        let popup = build_popup_html(&defaulted_grant());
        assert!(popup.contains(
            "In 1967, an unaffiliated, independent scholar (in Chicago, IL) \
             was awarded $12,000.00"
        ));
        assert!(popup.contains("AppNumber=AB-1234"));
        assert!(popup.contains("Research"));
        assert!(popup.contains("Humanities"));
        assert_eq!(popup.matches("unlisted").count(), 2);
    }

    #[test]
    fn popup_is_deterministic() {
        let grant = defaulted_grant();
        assert_eq!(build_popup_html(&grant), build_popup_html(&grant));
    }

    #[test]
    fn popup_escapes_interpolated_values() {
        let mut grant = defaulted_grant();
        grant.institution = "A <b>bold</b> & \"quoted\" society".to_string();
        let popup = build_popup_html(&grant);
        assert!(popup.contains("A &lt;b&gt;bold&lt;/b&gt; &amp; &quot;quoted&quot; society"));
        assert!(!popup.contains("<b>bold</b>"));
    }

    #[test]
    fn lookup_link_encodes_query_value() {
        let mut grant = defaulted_grant();
        grant.app_number = "AB 12/34".to_string();
        let popup = build_popup_html(&grant);
        assert!(popup.contains("AppNumber=AB%2012%2F34"));
    }

    #[test]
    fn escape_html_covers_all_special_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
    }
}
