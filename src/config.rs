use crate::error::AppError;

use std::env;
use std::net::SocketAddr;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_TWILIO_API_URL: &str = "https://api.twilio.com/2010-04-01";
const DEFAULT_DYTE_API_URL: &str = "https://api.dyte.io/v2";
const DEFAULT_DYTE_APP_URL: &str = "https://app.dyte.io";
const DEFAULT_DYTE_SIP_DOMAIN: &str = "sip.dyte.io";
const DEFAULT_HOLD_MUSIC_URL: &str = "https://cdn.pixabay.com/download/audio/2021/09/18/audio_44d1f6dbed.mp3?filename=reflection_30sec-8472.mp3";

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub api_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
    pub validate_signatures: bool,
}

#[derive(Debug, Clone)]
pub struct ChatwootConfig {
    pub instance_url: String,
    pub account_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct DyteConfig {
    pub api_url: String,
    pub app_url: String,
    pub org_id: String,
    pub api_key: String,
    pub sip_username: String,
    pub sip_password: String,
    pub sip_domain: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Externally reachable base URL of this service; every callback URL hangs off it.
    pub server_url: String,
    pub hold_music_url: String,
    pub twilio: TwilioConfig,
    pub chatwoot: ChatwootConfig,
    pub dyte: DyteConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let bind_addr = optional("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e| AppError::Config(format!("BIND_ADDR: {e}")))?;
        let validate_signatures = match optional("TWILIO_VALIDATE_SIGNATURES") {
            Some(v) => parse_bool(&v)
                .ok_or_else(|| AppError::Config(format!("TWILIO_VALIDATE_SIGNATURES: {v}")))?,
            None => true,
        };

        Ok(Self {
            bind_addr,
            server_url: trim_base(required("SERVER_URL")?),
            hold_music_url: optional("HOLD_MUSIC_URL")
                .unwrap_or_else(|| DEFAULT_HOLD_MUSIC_URL.to_string()),
            twilio: TwilioConfig {
                api_url: trim_base(
                    optional("TWILIO_API_URL").unwrap_or_else(|| DEFAULT_TWILIO_API_URL.into()),
                ),
                account_sid: required("TWILIO_ACCOUNT_SID")?,
                auth_token: required("TWILIO_AUTH_TOKEN")?,
                phone_number: required("TWILIO_PHONE_NUMBER")?,
                validate_signatures,
            },
            chatwoot: ChatwootConfig {
                instance_url: trim_base(required("CHATWOOT_INSTANCE_URL")?),
                account_id: required("CHATWOOT_ACCOUNT_ID")?,
                access_token: required("CHATWOOT_ACCESS_TOKEN")?,
            },
            dyte: DyteConfig {
                api_url: trim_base(
                    optional("DYTE_API_URL").unwrap_or_else(|| DEFAULT_DYTE_API_URL.into()),
                ),
                app_url: trim_base(
                    optional("DYTE_APP_URL").unwrap_or_else(|| DEFAULT_DYTE_APP_URL.into()),
                ),
                org_id: required("DYTE_ORG_ID")?,
                api_key: required("DYTE_API_KEY")?,
                sip_username: required("DYTE_SIP_USERNAME")?,
                sip_password: required("DYTE_SIP_PASSWORD")?,
                sip_domain: optional("DYTE_SIP_DOMAIN")
                    .unwrap_or_else(|| DEFAULT_DYTE_SIP_DOMAIN.into()),
            },
        })
    }

    /// Build an absolute callback URL on this service with url-encoded query parameters.
    pub fn callback_url(&self, path: &str, params: &[(&str, &str)]) -> String {
        let base = format!("{}{}", self.server_url, path);
        if params.is_empty() {
            return base;
        }
        match serde_urlencoded::to_string(params) {
            Ok(query) => format!("{base}?{query}"),
            Err(_) => base,
        }
    }
}

fn required(key: &str) -> Result<String, AppError> {
    optional(key).ok_or_else(|| AppError::Config(format!("{key} not set")))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_config;

    #[test]
    fn callback_url_encodes_query_values() {
        let config = test_config();
        let url = config.callback_url(
            "/api/dyte-agent-joined-outbound-call",
            &[("customerNumber", "+15551234567"), ("conversationId", "42")],
        );
        assert_eq!(
            url,
            "https://bridge.example.com/api/dyte-agent-joined-outbound-call\
             ?customerNumber=%2B15551234567&conversationId=42"
        );
    }

    #[test]
    fn callback_url_without_params_has_no_query() {
        let config = test_config();
        assert_eq!(
            config.callback_url("/api/twilio-failure", &[]),
            "https://bridge.example.com/api/twilio-failure"
        );
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("FALSE"), Some(false));
        assert_eq!(parse_bool(" on "), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn trim_base_drops_trailing_slashes() {
        assert_eq!(trim_base("https://x.test//".into()), "https://x.test");
    }
}
