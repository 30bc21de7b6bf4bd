pub fn wrap_twiml(twiml: String) -> String {
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{twiml}")
}

mod twiml {
    use xmlserde_derives::XmlSerialize;

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    #[xmlserde(root = b"Response")]
    pub struct Response {
        #[xmlserde(ty = "untag")]
        pub actions: Vec<ResponseAction>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum ResponseAction {
        #[xmlserde(name = b"Say")]
        Say(SayAction),
        #[xmlserde(name = b"Pause")]
        Pause(PauseAction),
        #[xmlserde(name = b"Play")]
        Play(PlayAction),
        #[xmlserde(name = b"Dial")]
        Dial(DialAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct SayAction {
        #[xmlserde(ty = "text")]
        pub text: String,
        #[xmlserde(name = b"voice", ty = "attr")]
        pub voice: Option<String>,
        #[xmlserde(name = b"loop", ty = "attr")]
        pub lp: Option<u16>,
        #[xmlserde(name = b"language", ty = "attr")]
        pub language: Option<String>,
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct PauseAction {
        #[xmlserde(name = b"length", ty = "attr")]
        pub length: Option<u16>,
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct PlayAction {
        #[xmlserde(ty = "text")]
        pub url: String,
        #[xmlserde(name = b"loop", ty = "attr")]
        pub lp: Option<u16>,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub struct DialAction {
        #[xmlserde(ty = "untag")]
        pub target: DialTarget,
    }

    #[derive(PartialEq, Eq, XmlSerialize)]
    pub enum DialTarget {
        #[xmlserde(name = b"Sip")]
        Sip(SipAction),
    }

    #[derive(PartialEq, Eq, XmlSerialize, Default)]
    pub struct SipAction {
        #[xmlserde(ty = "text")]
        pub uri: String,
        #[xmlserde(name = b"username", ty = "attr")]
        pub username: Option<String>,
        #[xmlserde(name = b"password", ty = "attr")]
        pub password: Option<String>,
    }

    impl Response {
        pub fn say(&mut self, text: impl Into<String>) -> &mut Self {
            self.actions.push(ResponseAction::Say(SayAction {
                text: text.into(),
                ..Default::default()
            }));
            self
        }

        pub fn pause(&mut self, seconds: u16) -> &mut Self {
            self.actions.push(ResponseAction::Pause(PauseAction {
                length: Some(seconds),
            }));
            self
        }

        pub fn play(&mut self, url: impl Into<String>) -> &mut Self {
            self.actions.push(ResponseAction::Play(PlayAction {
                url: url.into(),
                ..Default::default()
            }));
            self
        }

        pub fn dial_sip(&mut self, uri: String, username: String, password: String) -> &mut Self {
            self.actions.push(ResponseAction::Dial(DialAction {
                target: DialTarget::Sip(SipAction {
                    uri,
                    username: Some(username),
                    password: Some(password),
                }),
            }));
            self
        }

        pub fn into_twiml(self) -> String {
            super::wrap_twiml(xmlserde::xml_serialize(self))
        }
    }
}
pub use twiml::*;

mod callbacks {
    use serde::Deserialize;

    /// Provider call status. Anything Twilio adds later lands on `Unknown` rather than failing
    /// deserialization.
    #[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
    #[serde(from = "String")]
    pub enum CallStatus {
        Queued,
        Initiated,
        Ringing,
        InProgress,
        Completed,
        Busy,
        Failed,
        NoAnswer,
        Canceled,
        Unknown,
    }

    impl From<&str> for CallStatus {
        fn from(status: &str) -> Self {
            match status.trim().to_ascii_lowercase().as_str() {
                "queued" => CallStatus::Queued,
                "initiated" => CallStatus::Initiated,
                "ringing" => CallStatus::Ringing,
                "in-progress" | "answered" => CallStatus::InProgress,
                "completed" => CallStatus::Completed,
                "busy" => CallStatus::Busy,
                "failed" => CallStatus::Failed,
                "no-answer" => CallStatus::NoAnswer,
                "canceled" => CallStatus::Canceled,
                _ => CallStatus::Unknown,
            }
        }
    }

    impl From<String> for CallStatus {
        fn from(status: String) -> Self {
            CallStatus::from(status.as_str())
        }
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct InboundCallPayload {
        pub call_sid: Option<String>,
        pub from: Option<String>,
        pub to: Option<String>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct StatusCallbackPayload {
        pub call_sid: Option<String>,
        pub call_status: Option<String>,
        pub recording_url: Option<String>,
        pub recording_duration: Option<String>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct RecordingCallbackPayload {
        pub recording_url: Option<String>,
        pub recording_sid: Option<String>,
        pub call_sid: Option<String>,
        pub recording_duration: Option<String>,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(rename_all = "PascalCase")]
    pub struct FailurePayload {
        pub call_sid: Option<String>,
        pub call_status: Option<String>,
        pub error_code: Option<String>,
        pub error_url: Option<String>,
        pub error_message: Option<String>,
        pub from: Option<String>,
        pub to: Option<String>,
    }
}
pub use callbacks::*;

mod rest {
    use super::CallStatus;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone)]
    pub struct CallResource {
        pub sid: String,
        pub status: CallStatus,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct RecordingResource {
        pub sid: String,
    }

    /// Parameters for placing an outbound call leg.
    #[derive(Debug, Clone)]
    pub struct OutboundCallRequest {
        pub to: String,
        pub from: String,
        /// Fetched by Twilio once the callee answers, for the call instructions.
        pub url: String,
        pub status_callback: String,
        pub status_callback_events: Vec<&'static str>,
    }

    impl OutboundCallRequest {
        pub fn form(&self) -> Vec<(&'static str, String)> {
            let mut form = vec![
                ("To", self.to.clone()),
                ("From", self.from.clone()),
                ("Url", self.url.clone()),
                ("StatusCallback", self.status_callback.clone()),
                ("StatusCallbackMethod", "POST".to_string()),
            ];
            form.extend(
                self.status_callback_events
                    .iter()
                    .map(|event| ("StatusCallbackEvent", event.to_string())),
            );
            form
        }
    }
}
pub use rest::*;
