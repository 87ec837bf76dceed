//! Subscription name codec for the upstream event stream.
//!
//! Each on-chain event subscription is identified by a colon-joined tuple
//! `<topic>:<poolLocator>:<eventName>[:<poolData>]`. The pool locator is a
//! query string and contains no literal colons; `poolData` is caller-supplied
//! and may, so it is URL-escaped on pack and decoded on unpack. The topic
//! itself may contain colons, which is why unpacking strips the configured
//! topic as a literal prefix instead of splitting blindly.

use url::form_urlencoded;

/// The decoded parts of a subscription name, minus the topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSubscriptionName {
    pub pool_locator: String,
    pub event: String,
    pub pool_data: Option<String>,
}

/// Joins the parts into a subscription name, URL-escaping `pool_data`.
pub fn pack_subscription_name(
    topic: &str,
    pool_locator: &str,
    event: &str,
    pool_data: Option<&str>,
) -> String {
    match pool_data {
        Some(data) => {
            let escaped: String = form_urlencoded::byte_serialize(data.as_bytes()).collect();
            format!("{topic}:{pool_locator}:{event}:{escaped}")
        }
        None => format!("{topic}:{pool_locator}:{event}"),
    }
}

/// Splits a subscription name back into its parts.
///
/// Returns `None` when the name does not start with the configured topic.
/// The old two-segment form (no `poolData`) is accepted.
pub fn unpack_subscription_name(topic: &str, name: &str) -> Option<ParsedSubscriptionName> {
    let rest = name.strip_prefix(topic)?.strip_prefix(':')?;
    let mut parts = rest.splitn(3, ':');
    let pool_locator = parts.next()?.to_string();
    let event = parts.next()?.to_string();
    let pool_data = parts.next().map(url_decode);
    Some(ParsedSubscriptionName {
        pool_locator,
        event,
        pool_data,
    })
}

fn url_decode(s: &str) -> String {
    form_urlencoded::parse(format!("v={s}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}
