//! Minimal TwiML builder for the voice webhook.

use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verb {
    Play(String),
    Say(String),
    Gather { action: String, timeout_secs: u64 },
}

/// A `<Response>` document, built verb by verb.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Play(url.into()));
        self
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    /// Keep listening for speech, posting the result back to `action`.
    pub fn gather(mut self, action: impl Into<String>, timeout_secs: u64) -> Self {
        self.verbs.push(Verb::Gather {
            action: action.into(),
            timeout_secs,
        });
        self
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
        for verb in &self.verbs {
            // Writing into a String cannot fail.
            let _ = match verb {
                Verb::Play(url) => write!(out, "<Play>{}</Play>", escape(url)),
                Verb::Say(text) => write!(out, "<Say>{}</Say>", escape(text)),
                Verb::Gather { action, timeout_secs } => write!(
                    out,
                    r#"<Gather input="speech" action="{}" method="POST" timeout="{}"/>"#,
                    escape(action),
                    timeout_secs
                ),
            };
        }
        out.push_str("</Response>");
        out
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_then_gather() {
        let xml = VoiceResponse::new()
            .play("https://god.example.app/static/welcome.mp3")
            .gather("/voice", 2)
            .to_xml();
        assert_eq!(
            xml,
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Play>https://god.example.app/static/welcome.mp3</Play><Gather input="speech" action="/voice" method="POST" timeout="2"/></Response>"#
        );
    }

    #[test]
    fn text_is_escaped() {
        let xml = VoiceResponse::new().say("Tom & Nikki say <hi> \"now\"").to_xml();
        assert!(xml.contains("<Say>Tom &amp; Nikki say &lt;hi&gt; &quot;now&quot;</Say>"));
    }
}
