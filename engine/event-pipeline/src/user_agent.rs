//! User-agent classification
//!
//! The default classifier delegates parsing to `woothee` and folds its
//! categories into the coarse browser, OS and device names the stores keep.

use woothee::parser::Parser;

/// Coarse classification of a user-agent string. `None` means unrecognised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
}

/// Anything that can classify a user-agent string
pub trait UserAgentClassifier: Send + Sync {
    fn classify(&self, user_agent: &str) -> UserAgentInfo;
}

const UNKNOWN: &str = "UNKNOWN";

/// Default classifier backed by the woothee dataset
#[derive(Debug, Clone, Copy, Default)]
pub struct WootheeClassifier;

impl WootheeClassifier {
    fn known(value: &str) -> Option<&str> {
        match value.trim() {
            "" | UNKNOWN => None,
            value => Some(value),
        }
    }

    // woothee names Apple devices individually
    fn os(os: &str) -> Option<String> {
        let os = Self::known(os)?;
        let name = match os {
            "iPhone" | "iPad" | "iPod" => "iOS",
            "Mac OSX" => "Mac OS X",
            other => other,
        };
        Some(name.to_string())
    }

    fn device(category: &str, os: &str, user_agent: &str) -> Option<&'static str> {
        match category {
            "crawler" => Some("Robot"),
            "smartphone" | "mobilephone" => {
                if os == "iPad" || (os == "Android" && !user_agent.contains("Mobile")) {
                    Some("Tablet")
                } else {
                    Some("Mobile")
                }
            }
            "pc" => Some("Computer"),
            _ => None,
        }
    }
}

impl UserAgentClassifier for WootheeClassifier {
    fn classify(&self, user_agent: &str) -> UserAgentInfo {
        let user_agent = user_agent.trim();
        if user_agent.is_empty() {
            return UserAgentInfo::default();
        }

        let Some(parsed) = Parser::new().parse(user_agent) else {
            return UserAgentInfo::default();
        };

        let device_type = Self::device(parsed.category, parsed.os, user_agent);
        let browser = match device_type {
            Some("Robot") => Some("Robot".to_string()),
            _ => Self::known(parsed.name).map(str::to_string),
        };

        UserAgentInfo {
            browser,
            os: Self::os(parsed.os),
            device_type: device_type.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
    const CUBOT_PHONE: &str = "Mozilla/5.0 (Linux; Android 10; CUBOT X30) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/91.0.4472.120 Mobile Safari/537.36";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn test_desktop_chrome() {
        let info = WootheeClassifier.classify(CHROME_WINDOWS);
        assert_eq!(info.browser.as_deref(), Some("Chrome"));
        assert_eq!(info.os.as_deref(), Some("Windows 10"));
        assert_eq!(info.device_type.as_deref(), Some("Computer"));
    }

    #[test]
    fn test_iphone_is_ios_mobile() {
        let info = WootheeClassifier.classify(SAFARI_IPHONE);
        assert_eq!(info.browser.as_deref(), Some("Safari"));
        assert_eq!(info.os.as_deref(), Some("iOS"));
        assert_eq!(info.device_type.as_deref(), Some("Mobile"));
    }

    #[test]
    fn test_android_without_mobile_is_tablet() {
        let info = WootheeClassifier.classify(ANDROID_TABLET);
        assert_eq!(info.os.as_deref(), Some("Android"));
        assert_eq!(info.device_type.as_deref(), Some("Tablet"));
    }

    #[test]
    fn test_phone_model_containing_bot_is_not_a_robot() {
        let info = WootheeClassifier.classify(CUBOT_PHONE);
        assert_eq!(info.browser.as_deref(), Some("Chrome"));
        assert_eq!(info.os.as_deref(), Some("Android"));
        assert_eq!(info.device_type.as_deref(), Some("Mobile"));
    }

    #[test]
    fn test_crawler_is_robot() {
        let bot = WootheeClassifier.classify(GOOGLEBOT);
        assert_eq!(bot.browser.as_deref(), Some("Robot"));
        assert_eq!(bot.device_type.as_deref(), Some("Robot"));
    }

    #[test]
    fn test_blank_is_unrecognised() {
        assert_eq!(WootheeClassifier.classify("   "), UserAgentInfo::default());
        assert_eq!(WootheeClassifier.classify(""), UserAgentInfo::default());
    }
}
