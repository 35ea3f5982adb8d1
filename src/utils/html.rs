// src/utils/html.rs

/// Clean admin-supplied HTML with ammonia's whitelist.
///
/// Safe formatting tags (like <b>, <sub>, <p>) survive so question text can
/// carry markup; <script>, <iframe> and event-handler attributes are dropped.
///
/// Note: a <script> tag is removed together with its content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_but_keeps_formatting() {
        let cleaned = clean_html("H<sub>2</sub>O<script>alert(1)</script>");
        assert_eq!(cleaned, "H<sub>2</sub>O");
    }

    #[test]
    fn drops_event_handlers() {
        let cleaned = clean_html(r#"<b onclick="steal()">bold</b>"#);
        assert_eq!(cleaned, "<b>bold</b>");
    }
}
