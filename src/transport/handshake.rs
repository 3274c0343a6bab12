use std::net::IpAddr;

use tungstenite::handshake::server::Request;
use tungstenite::http::header::COOKIE;
use url::form_urlencoded;

use crate::gate::Handshake;

/// Query parameter naming the requested topic.
pub const TOPIC_PARAM: &str = "p";

/// Captures the admission inputs from an upgrade request. Multiple cookie
/// headers are joined the way a browser would send them.
pub fn from_request(request: &Request, address: IpAddr) -> Handshake {
    let cookies: Vec<&str> = request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    let cookie = if cookies.is_empty() {
        None
    } else {
        Some(cookies.join("; "))
    };

    let topic = request.uri().query().and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == TOPIC_PARAM)
            .map(|(_, value)| value.into_owned())
    });

    Handshake {
        cookie,
        topic,
        address,
    }
}
