// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use actix_web::HttpRequest;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ApiError;

const SWEEP_THRESHOLD: usize = 10_000;

/// Per-IP sliding window. In-memory is fine here: limits reset on restart
/// and each process enforces its own window.
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    trust_proxy: bool,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(
        window: Duration,
        max_requests: usize,
        trust_proxy: bool,
    ) -> Self {
        Self {
            window,
            max_requests,
            trust_proxy,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, req: &HttpRequest) -> Result<(), ApiError> {
        // A zero budget admits nothing; there is no window to wait out.
        if self.max_requests == 0 {
            return Err(ApiError::RateLimited {
                retry_after_secs: self.window.as_secs().max(1),
            });
        }

        let key = self.client_key(req);
        let now = Instant::now();
        let mut hits = self
            .hits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if hits.len() > SWEEP_THRESHOLD {
            let window = self.window;
            hits.retain(|_, stamps| {
                stamps
                    .back()
                    .map(|last| now.duration_since(*last) < window)
                    .unwrap_or(false)
            });
        }

        let stamps = hits.entry(key).or_default();
        while let Some(first) = stamps.front() {
            if now.duration_since(*first) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.max_requests {
            if let Some(oldest) = stamps.front() {
                let retry_after = self
                    .window
                    .saturating_sub(now.duration_since(*oldest));
                return Err(ApiError::RateLimited {
                    retry_after_secs: retry_after.as_secs().max(1),
                });
            }
        }

        stamps.push_back(now);
        Ok(())
    }

    fn client_key(&self, req: &HttpRequest) -> String {
        if self.trust_proxy {
            if let Some(forwarded) = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
            {
                if let Some(first) = forwarded.split(',').next() {
                    let first = first.trim();
                    if !first.is_empty() {
                        return first.to_owned();
                    }
                }
            }
        }
        req.peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn limits_after_max_requests() {
        let limiter =
            RateLimiter::new(Duration::from_secs(60), 3, false);
        let req = TestRequest::default()
            .peer_addr("10.1.2.3:9999".parse().unwrap())
            .to_http_request();

        for _ in 0..3 {
            limiter.check(&req).unwrap();
        }
        let err = limiter.check(&req).unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { .. }));
    }

    #[test]
    fn zero_budget_limits_every_request() {
        let limiter =
            RateLimiter::new(Duration::from_secs(60), 0, false);
        let req = TestRequest::default()
            .peer_addr("10.1.2.3:9999".parse().unwrap())
            .to_http_request();

        let err = limiter.check(&req).unwrap_err();
        assert!(matches!(
            err,
            ApiError::RateLimited { retry_after_secs } if retry_after_secs >= 1
        ));
    }

    #[test]
    fn separate_ips_have_separate_windows() {
        let limiter =
            RateLimiter::new(Duration::from_secs(60), 1, false);
        let first = TestRequest::default()
            .peer_addr("10.0.0.1:1000".parse().unwrap())
            .to_http_request();
        let second = TestRequest::default()
            .peer_addr("10.0.0.2:1000".parse().unwrap())
            .to_http_request();

        limiter.check(&first).unwrap();
        limiter.check(&second).unwrap();
        assert!(limiter.check(&first).is_err());
    }

    #[test]
    fn forwarded_header_used_only_behind_proxy() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.9:1000".parse().unwrap())
            .insert_header(("x-forwarded-for", "203.0.113.7, 10.0.0.9"))
            .to_http_request();

        let trusting =
            RateLimiter::new(Duration::from_secs(60), 1, true);
        assert_eq!(trusting.client_key(&req), "203.0.113.7");

        let direct =
            RateLimiter::new(Duration::from_secs(60), 1, false);
        assert_eq!(direct.client_key(&req), "10.0.0.9");
    }
}
