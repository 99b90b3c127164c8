//! Turning human-readable titles into path segments.

/// Strip every character that is not alphanumeric.
///
/// No separators are kept and case is preserved, so `"Q3 Report (Final)!"`
/// becomes `"Q3ReportFinal"`. Distinct titles can collapse onto the same
/// segment; callers get no collision handling from this function.
pub fn sanitize(title: &str) -> String {
    title.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// File name for a downloaded attachment.
///
/// Unlike [`sanitize`] this keeps the attachment's own name and extension, but
/// drops path separators, control characters and leading dots so an upstream
/// title can never point outside the destination directory.
pub fn attachment_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':') && !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_spaces() {
        assert_eq!(sanitize("Q3 Report (Final)!"), "Q3ReportFinal");
    }

    #[test]
    fn keeps_unicode_letters() {
        assert_eq!(sanitize("Über-Plan 2024/β"), "ÜberPlan2024β");
    }

    #[test]
    fn empty_and_symbol_only_titles() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("-- / --"), "");
    }

    #[test]
    fn attachment_names_cannot_escape() {
        assert_eq!(attachment_file_name("../../etc/passwd"), "etcpasswd");
        assert_eq!(attachment_file_name("diagram v2.png"), "diagram v2.png");
        assert_eq!(attachment_file_name("..."), "attachment");
        assert_eq!(attachment_file_name("C:\\temp\\x.txt"), "Ctempx.txt");
    }
}
