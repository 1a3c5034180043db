//! Named rate-limit policies.
//!
//! Policies form a closed set so call sites cannot name a policy that does not
//! exist. The limits behind each name are fixed once at startup in a
//! [`PolicyTable`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Named admission policy applied by the rate-limit layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Anonymous reads
    Public,
    /// Reads by an authenticated subject
    Authenticated,
    /// Mutations
    Write,
    /// Credential and account operations
    Sensitive,
}

impl Policy {
    pub const ALL: [Policy; 4] = [
        Policy::Public,
        Policy::Authenticated,
        Policy::Write,
        Policy::Sensitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Public => "public",
            Policy::Authenticated => "authenticated",
            Policy::Write => "write",
            Policy::Sensitive => "sensitive",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Policy::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PolicyError::UnknownPolicy(s.to_string()))
    }
}

/// Window size and request cap for one policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    window: Duration,
    max_requests: u32,
}

impl RateLimitPolicy {
    /// Create a policy; both the window and the cap must be non-zero.
    pub fn new(window: Duration, max_requests: u32) -> Result<Self, PolicyError> {
        if window.as_millis() == 0 {
            return Err(PolicyError::ZeroWindow);
        }
        if max_requests == 0 {
            return Err(PolicyError::ZeroMaxRequests);
        }
        Ok(Self {
            window,
            max_requests,
        })
    }

    const fn preset(window_secs: u64, max_requests: u32) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            max_requests,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn window_millis(&self) -> u64 {
        self.window.as_millis() as u64
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

/// Limits for every [`Policy`], resolved at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    limits: [RateLimitPolicy; 4],
}

impl PolicyTable {
    /// Replace the limits of one policy
    pub fn with(mut self, policy: Policy, limits: RateLimitPolicy) -> Self {
        self.limits[policy.index()] = limits;
        self
    }

    pub fn get(&self, policy: Policy) -> RateLimitPolicy {
        self.limits[policy.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Policy, RateLimitPolicy)> + '_ {
        Policy::ALL.into_iter().map(|p| (p, self.get(p)))
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            limits: [
                RateLimitPolicy::preset(60, 100),
                RateLimitPolicy::preset(60, 300),
                RateLimitPolicy::preset(60, 20),
                RateLimitPolicy::preset(15 * 60, 5),
            ],
        }
    }
}
