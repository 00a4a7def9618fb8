use governor::{
    clock::QuantaClock,
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota, RateLimiter
};
use nonzero_ext::nonzero;
use std::{
    net::IpAddr,
    num::NonZeroU32,
    sync::Arc,
};

/// A rate limiter for connection attempts, keyed by client IP.
///
/// Keys are IP addresses rather than socket addresses: every new connection
/// from the same host arrives on a fresh source port.
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    /// The underlying rate limiter instance, shared across instances.
    limiter: Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, QuantaClock, NoOpMiddleware>>,
}

impl ConnectionRateLimiter {
    /// Creates a new `ConnectionRateLimiter` allowing `per_second` attempts
    /// per second from one address. A zero limit is raised to one.
    pub fn new(per_second: u32) -> Self {
        let burst_size = NonZeroU32::new(per_second).unwrap_or(nonzero!(1u32));

        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_second(burst_size))),
        }
    }

    /// Checks whether a connection from `ip` is allowed right now.
    ///
    /// Unlike a blocking wait, a refused attempt is reported immediately so
    /// the caller can drop the socket.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Forgets addresses whose quota has fully replenished.
    pub fn prune(&self) {
        self.limiter.retain_recent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn refuses_bursts_per_address() {
        let limiter = ConnectionRateLimiter::new(2);
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(limiter.check(a));
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }
}
