use std::sync::OnceLock;

use regex::Regex;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static PHONE_RE: OnceLock<Regex> = OnceLock::new();
static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn email_re() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
    })
}

fn phone_re() -> &'static Regex {
    // Optional leading +, then digits with common separators
    PHONE_RE.get_or_init(|| {
        Regex::new(r"^\+?[0-9\s\-().]{7,20}$").expect("phone pattern compiles")
    })
}

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| {
        Regex::new(r"^[\p{L}\s'.\-]+$").expect("name pattern compiles")
    })
}

/// Basic `local@domain.tld` shape check
pub fn is_valid_email(email: &str) -> bool {
    email_re().is_match(email.trim())
}

/// Phone shape check, requires at least 7 digits
pub fn is_valid_phone(phone: &str) -> bool {
    let phone = phone.trim();
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    phone_re().is_match(phone) && digits >= 7
}

/// Letters, spaces, apostrophes, periods and hyphens
pub fn is_valid_name(name: &str) -> bool {
    name_re().is_match(name.trim())
}
