//! Localized alert message templates.

use super::AlertContext;
use crate::detect::AlertLevel;

/// Returned when no template exists for the language/level pair.
pub const FALLBACK_MESSAGE: &str = "Alert message unavailable";

pub const SUPPORTED_LANGUAGES: [&str; 2] = ["en", "hi"];

/// Render the message for `ctx` in `language` (`"en"`, `"hi"`; case-insensitive).
/// Unknown languages yield [`FALLBACK_MESSAGE`].
pub fn format_alert(ctx: &AlertContext, language: &str) -> String {
    render(ctx, &language.trim().to_ascii_lowercase()).unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

fn render(ctx: &AlertContext, language: &str) -> Option<String> {
    let AlertContext {
        district,
        disease,
        alert_level,
        current_cases,
        average_cases,
    } = ctx;

    let text = match (language, (*alert_level)?) {
        ("en", AlertLevel::Critical) => format!(
            "🚨 *CRITICAL ALERT* 🚨\n\
             📍 Location: {district}\n\
             🦠 Disease: {disease}\n\
             📊 Cases: {current_cases} (Normal: {average_cases})\n\
             ⚠️ Severe outbreak detected!\n\
             📞 Emergency: 108"
        ),
        ("en", AlertLevel::High) => format!(
            "🚨 *HIGH ALERT*\n\
             📍 {district}\n\
             🦠 {disease}\n\
             📊 Rising cases: {current_cases}, stay alert!\n\
             📞 Seek care early. Emergency: 108"
        ),
        ("en", AlertLevel::Medium) => format!(
            "⚠️ *CAUTION ALERT*\n\
             📍 {district}\n\
             🦠 {disease}\n\
             📊 Cases increasing: {current_cases}."
        ),
        ("en", AlertLevel::Low) => format!(
            "ℹ️ *INFO*\n\
             {district} situation is under control ({current_cases} cases)."
        ),
        ("hi", AlertLevel::Critical) => format!(
            "🚨 *अत्यंत गंभीर अलर्ट* 🚨\n\
             📍 स्थान: {district}\n\
             🦠 बीमारी: {disease}\n\
             📊 मामले: {current_cases} (सामान्य: {average_cases})\n\
             ⚠️ आपके क्षेत्र में गंभीर प्रकोप पाया गया!\n\
             📞 आपातकाल: 108"
        ),
        ("hi", AlertLevel::High) => format!(
            "🚨 *गंभीर अलर्ट* 🚨\n\
             📍 {district}\n\
             🦠 {disease}\n\
             📊 मामले: {current_cases}\n\
             ⚠️ सावधानी बरतें! आपातकाल: 108"
        ),
        ("hi", AlertLevel::Medium) => format!(
            "⚠️ *सावधानी अलर्ट*\n\
             📍 {district}\n\
             🦠 {disease}\n\
             📊 मामले बढ़ रहे हैं: {current_cases}"
        ),
        ("hi", AlertLevel::Low) => format!(
            "ℹ️ *जानकारी*\n\
             {district} में स्थिति सामान्य है।\n\
             📊 मामले: {current_cases}"
        ),
        _ => return None,
    };

    Some(text)
}
