use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::{debug, trace};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a webhook body the way the provider does: HMAC-SHA256 over the raw bytes, hex encoded.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take a key of any size");
    mac.update(body);
    mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

/// Check a webhook signature against the raw body bytes. The comparison runs in constant time,
/// so a forger learns nothing from response timing.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(sig) = decode_hex(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&sig).is_ok()
}

/// Constant-time equality for API keys. Comparing HMAC digests of the two values instead of the
/// values themselves means response timing reveals nothing about where they diverge.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    const COMPARE_KEY: &[u8] = b"cpg-key-compare";
    let mut mac = HmacSha256::new_from_slice(COMPARE_KEY).expect("HMAC can take a key of any size");
    mac.update(a.as_bytes());
    let tag = mac.finalize().into_bytes();
    let mut mac = HmacSha256::new_from_slice(COMPARE_KEY).expect("HMAC can take a key of any size");
    mac.update(b.as_bytes());
    mac.verify_slice(&tag).is_ok()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| s.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok())).collect()
}

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in
/// decreasing order of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result =
            req.headers().get("X-Forwarded-For").and_then(|v| v.to_str().ok()).and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').find_map(|part| part.trim().strip_prefix("for=")))
            .and_then(|s| IpAddr::from_str(s.trim_matches('"')).ok());
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}
