//! Canonical spellings for walk-task conditions and post-injury timepoints.

use super::model::CellValue;

/// The three walk-task conditions of the gait protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    SingleTask,
    HeadTurn,
    DualTask,
}

impl Condition {
    const ALL: [Condition; 3] = [
        Condition::SingleTask,
        Condition::HeadTurn,
        Condition::DualTask,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Condition::SingleTask => "ST",
            Condition::HeadTurn => "HT",
            Condition::DualTask => "DT",
        }
    }

    fn phrase(self) -> &'static str {
        match self {
            Condition::SingleTask => "single task",
            Condition::HeadTurn => "head turn",
            Condition::DualTask => "dual task",
        }
    }

    /// Recognise a free-text condition: the long phrase anywhere in the
    /// value, or the bare token, case-insensitive.
    pub fn recognise(text: &str) -> Option<Condition> {
        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();
        Condition::ALL
            .into_iter()
            .find(|c| lower.contains(c.phrase()) || trimmed.eq_ignore_ascii_case(c.token()))
    }
}

/// `"Single Task"` → `"ST"`; unrecognised text is returned trimmed.
pub fn standardize_condition_str(text: &str) -> String {
    match Condition::recognise(text) {
        Some(c) => c.token().to_string(),
        None => text.trim().to_string(),
    }
}

/// `"post injury 2"` → `"PI-2"`. Only the first run of digits is used.
pub fn standardize_timepoint_str(text: &str) -> String {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();
    if lower.contains("post injury") || lower.contains("pi") {
        if let Some(digits) = first_digit_run(trimmed) {
            return format!("PI-{digits}");
        }
    }
    trimmed.to_string()
}

/// Missing cells pass through untouched.
pub fn standardize_condition(value: &CellValue) -> CellValue {
    match value.to_label() {
        Some(text) => CellValue::String(standardize_condition_str(&text)),
        None => value.clone(),
    }
}

/// Missing cells pass through untouched.
pub fn standardize_timepoint(value: &CellValue) -> CellValue {
    match value.to_label() {
        Some(text) => CellValue::String(standardize_timepoint_str(&text)),
        None => value.clone(),
    }
}

fn first_digit_run(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_variations() {
        for raw in ["single task", "Single Task", "SINGLE TASK", "ST", "st", "  single task  "] {
            assert_eq!(standardize_condition_str(raw), "ST", "{raw}");
        }
        for raw in ["head turn", "HEAD TURN", "HT", "ht", "Walk with head turn"] {
            assert_eq!(standardize_condition_str(raw), "HT", "{raw}");
        }
        for raw in ["dual task", "Dual Task", "DT", "  dt "] {
            assert_eq!(standardize_condition_str(raw), "DT", "{raw}");
        }
    }

    #[test]
    fn unknown_condition_is_trimmed_only() {
        assert_eq!(standardize_condition_str("Unknown"), "Unknown");
        assert_eq!(standardize_condition_str("  Custom Task "), "Custom Task");
        assert_eq!(standardize_condition_str("STX"), "STX");
    }

    #[test]
    fn condition_is_idempotent() {
        for raw in ["single task", " HT ", "Custom", "dual TASK", "", "  "] {
            let once = standardize_condition_str(raw);
            assert_eq!(standardize_condition_str(&once), once);
        }
    }

    #[test]
    fn timepoint_variations() {
        assert_eq!(standardize_timepoint_str("post injury 1"), "PI-1");
        assert_eq!(standardize_timepoint_str("Post Injury 2"), "PI-2");
        assert_eq!(standardize_timepoint_str("POST INJURY 3"), "PI-3");
        assert_eq!(standardize_timepoint_str("pi 1"), "PI-1");
        assert_eq!(standardize_timepoint_str("PI 2"), "PI-2");
        assert_eq!(standardize_timepoint_str("pi-3"), "PI-3");
        assert_eq!(standardize_timepoint_str("PI-12"), "PI-12");
    }

    #[test]
    fn timepoint_uses_first_digit_run() {
        assert_eq!(standardize_timepoint_str("pi 2 of 3"), "PI-2");
    }

    #[test]
    fn timepoint_without_keyword_or_digits_is_trimmed() {
        assert_eq!(standardize_timepoint_str("Baseline"), "Baseline");
        assert_eq!(standardize_timepoint_str(" Follow-up "), "Follow-up");
        assert_eq!(standardize_timepoint_str("Post injury"), "Post injury");
        assert_eq!(standardize_timepoint_str("Week 3"), "Week 3");
    }

    #[test]
    fn missing_values_pass_through() {
        assert_eq!(standardize_condition(&CellValue::Null), CellValue::Null);
        assert_eq!(standardize_timepoint(&CellValue::Null), CellValue::Null);
        assert!(standardize_timepoint(&CellValue::Float(f64::NAN)).is_missing());
    }

    #[test]
    fn non_text_cells_become_labels() {
        assert_eq!(
            standardize_condition(&CellValue::String("Dual Task".into())),
            CellValue::String("DT".into())
        );
        assert_eq!(
            standardize_timepoint(&CellValue::Integer(2)),
            CellValue::String("2".into())
        );
    }
}
