//! Event enrichment
//!
//! Turns a validated raw event into its immutable enriched form. Enrichment
//! never rejects: every branch fills a gap and leaves present values alone, so
//! enriching an already complete event yields the same event.

use crate::events::{
    Click, EventBase, InboundEvent, PageView, RawBase, RawClick, RawPageView, RawScroll,
    RawSession, Scroll, Session,
};
use crate::user_agent::{UserAgentClassifier, UserAgentInfo, WootheeClassifier};
use std::net::IpAddr;
use std::sync::Arc;

/// Server timestamp format used when the client sends none
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder for values that cannot be derived
pub const UNKNOWN: &str = "Unknown";

/// Request metadata the enricher and the rate limiter read from
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_agent: Option<String>,
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub remote_addr: Option<IpAddr>,
}

impl RequestContext {
    /// Resolve the client address: first `X-Forwarded-For` hop, then
    /// `X-Real-IP`, then the socket address.
    pub fn client_ip(&self) -> String {
        if let Some(first) = self
            .forwarded_for
            .as_deref()
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
        {
            return first.to_string();
        }

        if let Some(real_ip) = self.real_ip.as_deref().map(str::trim).filter(|ip| !ip.is_empty()) {
            return real_ip.to_string();
        }

        self.remote_addr.map(|addr| addr.to_string()).unwrap_or_else(|| "unknown".to_string())
    }
}

/// Kind-specific enrichment
pub trait Enrich: InboundEvent {
    fn enrich(self, enricher: &EventEnricher, ctx: &RequestContext) -> Self::Enriched;
}

/// Fills derived and default fields on inbound events
#[derive(Clone)]
pub struct EventEnricher {
    classifier: Arc<dyn UserAgentClassifier>,
}

impl Default for EventEnricher {
    fn default() -> Self {
        Self::new(Arc::new(WootheeClassifier))
    }
}

impl std::fmt::Debug for EventEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEnricher").finish_non_exhaustive()
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl EventEnricher {
    pub fn new(classifier: Arc<dyn UserAgentClassifier>) -> Self {
        Self { classifier }
    }

    /// Enrich any raw event kind
    pub fn enrich<T: Enrich>(&self, event: T, ctx: &RequestContext) -> T::Enriched {
        event.enrich(self, ctx)
    }

    fn enrich_base(&self, base: RawBase, ctx: &RequestContext) -> EventBase {
        let timestamp = present(base.timestamp)
            .unwrap_or_else(|| chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string());

        let user_agent = present(base.user_agent)
            .or_else(|| present(ctx.user_agent.clone()))
            .unwrap_or_default();

        let browser = present(base.browser);
        let os = present(base.os);
        let device_type = present(base.device_type);

        // Only parse when something is actually missing
        let parsed = if browser.is_none() || os.is_none() || device_type.is_none() {
            self.classifier.classify(&user_agent)
        } else {
            UserAgentInfo::default()
        };

        EventBase {
            session_id: base.session_id.unwrap_or_default(),
            user_id: base.user_id,
            page_url: base.page_url.unwrap_or_default(),
            timestamp,
            user_agent,
            ip_address: present(base.ip_address).unwrap_or_else(|| ctx.client_ip()),
            browser: browser.or(parsed.browser).unwrap_or_else(|| UNKNOWN.to_string()),
            os: os.or(parsed.os).unwrap_or_else(|| UNKNOWN.to_string()),
            device_type: device_type
                .or(parsed.device_type)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            // Geolocation is not resolved
            country: present(base.country).unwrap_or_else(|| UNKNOWN.to_string()),
            city: present(base.city).unwrap_or_else(|| UNKNOWN.to_string()),
            referrer: base.referrer.unwrap_or_default(),
        }
    }
}

impl Enrich for RawPageView {
    fn enrich(self, enricher: &EventEnricher, ctx: &RequestContext) -> PageView {
        PageView {
            base: enricher.enrich_base(self.base, ctx),
            page_title: self.page_title.unwrap_or_default(),
            load_time: self.load_time.unwrap_or(0),
        }
    }
}

impl Enrich for RawClick {
    fn enrich(self, enricher: &EventEnricher, ctx: &RequestContext) -> Click {
        Click {
            base: enricher.enrich_base(self.base, ctx),
            element_id: self.element_id.unwrap_or_default(),
            element_text: self.element_text.unwrap_or_default(),
            click_x: self.click_x.unwrap_or(0),
            click_y: self.click_y.unwrap_or(0),
        }
    }
}

impl Enrich for RawScroll {
    fn enrich(self, enricher: &EventEnricher, ctx: &RequestContext) -> Scroll {
        Scroll {
            base: enricher.enrich_base(self.base, ctx),
            scroll_depth: self.scroll_depth.unwrap_or(0),
            scroll_percentage: self.scroll_percentage.unwrap_or(0.0),
        }
    }
}

impl Enrich for RawSession {
    fn enrich(self, enricher: &EventEnricher, ctx: &RequestContext) -> Session {
        Session {
            base: enricher.enrich_base(self.base, ctx),
            event_type: self.event_type.unwrap_or_default(),
            duration: self.duration.unwrap_or(0),
            page_count: self.page_count.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0";

    fn ctx() -> RequestContext {
        RequestContext {
            user_agent: Some(FIREFOX_LINUX.to_string()),
            forwarded_for: None,
            real_ip: None,
            remote_addr: Some("192.168.1.20".parse().unwrap()),
        }
    }

    fn minimal_click() -> RawClick {
        RawClick {
            base: RawBase {
                session_id: Some("s1".to_string()),
                page_url: Some("/checkout".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_filled() {
        let click = EventEnricher::default().enrich(minimal_click(), &ctx());

        assert!(!click.base.timestamp.trim().is_empty());
        assert!(
            chrono::NaiveDateTime::parse_from_str(&click.base.timestamp, TIMESTAMP_FORMAT).is_ok()
        );
        assert_eq!(click.base.user_agent, FIREFOX_LINUX);
        assert_eq!(click.base.browser, "Firefox");
        assert_eq!(click.base.os, "Linux");
        assert_eq!(click.base.device_type, "Computer");
        assert_eq!(click.base.country, UNKNOWN);
        assert_eq!(click.base.city, UNKNOWN);
        assert_eq!(click.base.ip_address, "192.168.1.20");
        assert_eq!(click.base.referrer, "");
        assert_eq!(click.element_id, "");
        assert_eq!(click.element_text, "");
        assert_eq!((click.click_x, click.click_y), (0, 0));
    }

    #[test]
    fn test_client_supplied_values_are_kept() {
        let mut raw = minimal_click();
        raw.base.timestamp = Some("2024-01-02T03:04:05Z".to_string());
        raw.base.browser = Some("Custom Browser".to_string());
        raw.base.country = Some("NL".to_string());
        raw.click_x = Some(14);

        let click = EventEnricher::default().enrich(raw, &ctx());
        assert_eq!(click.base.timestamp, "2024-01-02T03:04:05Z");
        assert_eq!(click.base.browser, "Custom Browser");
        assert_eq!(click.base.os, "Linux");
        assert_eq!(click.base.country, "NL");
        assert_eq!(click.click_x, 14);
    }

    #[test]
    fn test_unparseable_user_agent_defaults_to_unknown() {
        let context = RequestContext { user_agent: None, ..ctx() };
        let scroll = EventEnricher::default().enrich(
            RawScroll { base: minimal_click().base, ..Default::default() },
            &context,
        );
        assert_eq!(scroll.base.user_agent, "");
        assert_eq!(scroll.base.browser, UNKNOWN);
        assert_eq!(scroll.base.os, UNKNOWN);
        assert_eq!(scroll.base.device_type, UNKNOWN);
        assert_eq!(scroll.scroll_depth, 0);
        assert_eq!(scroll.scroll_percentage, 0.0);
    }

    #[test]
    fn test_enrichment_is_idempotent() {
        let enricher = EventEnricher::default();
        let session = RawSession {
            base: RawBase { session_id: Some("s9".to_string()), ..Default::default() },
            event_type: Some("session_end".to_string()),
            duration: Some(310),
            ..Default::default()
        };

        let once = enricher.enrich(session, &ctx());
        let twice = enricher.enrich(RawSession::from(once.clone()), &ctx());
        assert_eq!(once, twice);

        let page_view = enricher.enrich(
            RawPageView { base: minimal_click().base, ..Default::default() },
            &ctx(),
        );
        let again = enricher.enrich(RawPageView::from(page_view.clone()), &ctx());
        assert_eq!(page_view, again);
    }

    #[test]
    fn test_client_ip_precedence() {
        let mut context = ctx();
        assert_eq!(context.client_ip(), "192.168.1.20");

        context.real_ip = Some("10.1.1.1".to_string());
        assert_eq!(context.client_ip(), "10.1.1.1");

        context.forwarded_for = Some(" 203.0.113.7 , 10.0.0.2".to_string());
        assert_eq!(context.client_ip(), "203.0.113.7");

        let empty = RequestContext::default();
        assert_eq!(empty.client_ip(), "unknown");
    }
}
