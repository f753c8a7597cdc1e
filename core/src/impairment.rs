//! Link simulator knobs and named impairments.
//!
//! A profile only stores the knobs that were set explicitly; everything else
//! falls back to [`Knob::neutral`] when the simulator command line is built.
//! Merging is a knob-wise union where the right-hand side wins, so composing
//! impairments that touch disjoint knobs is order independent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Knob {
    Port,
    ForwardPort,
    Delay,
    Jitter,
    ErrRate,
    CutRate,
    LossRate,
    Seed,
}

impl Knob {
    pub const DEFAULT_SEED: u64 = 379097246178890316;

    /// Single-letter flag understood by the link simulator.
    pub fn flag(self) -> char {
        use Knob::*;
        match self {
            Port => 'p',
            ForwardPort => 'P',
            Delay => 'd',
            Jitter => 'j',
            ErrRate => 'e',
            CutRate => 'c',
            LossRate => 'l',
            Seed => 's',
        }
    }

    pub fn neutral(self) -> u64 {
        use Knob::*;
        match self {
            Port => 1234,
            ForwardPort => 12345,
            Delay | Jitter | ErrRate | CutRate | LossRate => 0,
            Seed => Self::DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpairmentProfile {
    knobs: BTreeMap<Knob, u64>,
}

impl ImpairmentProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, knob: Knob, value: u64) -> Self {
        self.knobs.insert(knob, value);
        self
    }

    /// Effective value, neutral default included.
    pub fn get(&self, knob: Knob) -> u64 {
        self.explicit(knob).unwrap_or_else(|| knob.neutral())
    }

    pub fn explicit(&self, knob: Knob) -> Option<u64> {
        self.knobs.get(&knob).copied()
    }

    pub fn is_neutral(&self) -> bool {
        Knob::iter().all(|k| self.get(k) == k.neutral())
    }

    /// Knob-wise union; `other` wins on collision.
    pub fn merge(&self, other: &ImpairmentProfile) -> Self {
        let mut knobs = self.knobs.clone();
        knobs.extend(other.knobs.iter().map(|(&k, &v)| (k, v)));
        Self { knobs }
    }

    /// Port the sender talks to (the simulator's listening port).
    pub fn sender_port(&self) -> u64 {
        self.get(Knob::Port)
    }

    /// Port the receiver listens on (where the simulator forwards to).
    pub fn receiver_port(&self) -> u64 {
        self.get(Knob::ForwardPort)
    }

    /// ```
    /// use linkgrade_core::impairment::{ImpairmentProfile, Knob};
    ///
    /// let args = ImpairmentProfile::new().set(Knob::LossRate, 5).to_args();
    /// assert_eq!(&args[..4], ["-p", "1234", "-P", "12345"]);
    /// assert!(args.windows(2).any(|w| w == ["-l", "5"]));
    /// ```
    pub fn to_args(&self) -> Vec<String> {
        Knob::iter()
            .flat_map(|k| [format!("-{}", k.flag()), self.get(k).to_string()])
            .collect()
    }
}

impl fmt::Display for ImpairmentProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = Knob::iter()
            .map(|k| format!("{}={}", k, self.get(k)))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", s)
    }
}

/// A named set of knobs moved away from neutral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Impairment {
    name: String,
    profile: ImpairmentProfile,
}

impl Impairment {
    pub const DEFAULT_RATE: u64 = 5;
    pub const DEFAULT_DELAY_MS: u64 = 50;
    pub const DEFAULT_JITTER_MS: u64 = 30;

    pub fn new(name: impl Into<String>, profile: ImpairmentProfile) -> Self {
        Self {
            name: name.into(),
            profile,
        }
    }

    pub fn latency(delay_ms: u64, jitter_ms: u64) -> Self {
        Self::new(
            format!("latency {} {}", delay_ms, jitter_ms),
            ImpairmentProfile::new()
                .set(Knob::Delay, delay_ms)
                .set(Knob::Jitter, jitter_ms),
        )
    }

    pub fn corruption(err_rate: u64) -> Self {
        Self::single(Knob::ErrRate, err_rate)
    }

    pub fn truncation(cut_rate: u64) -> Self {
        Self::single(Knob::CutRate, cut_rate)
    }

    pub fn loss(loss_rate: u64) -> Self {
        Self::single(Knob::LossRate, loss_rate)
    }

    fn single(knob: Knob, value: u64) -> Self {
        Self::new(
            format!("{} {}", knob, value),
            ImpairmentProfile::new().set(knob, value),
        )
    }

    /// Every impairment at once: latency, truncation, corruption and loss.
    pub fn unreliable() -> Self {
        Self::compose([
            Self::latency(Self::DEFAULT_DELAY_MS, Self::DEFAULT_JITTER_MS),
            Self::truncation(Self::DEFAULT_RATE),
            Self::corruption(Self::DEFAULT_RATE),
            Self::loss(Self::DEFAULT_RATE),
        ])
    }

    /// Union of all components; names are concatenated in the given order.
    pub fn compose(parts: impl IntoIterator<Item = Impairment>) -> Self {
        let mut names = Vec::new();
        let mut profile = ImpairmentProfile::new();
        for p in parts {
            profile = profile.merge(&p.profile);
            names.push(p.name);
        }
        Self::new(names.join(" "), profile)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &ImpairmentProfile {
        &self.profile
    }

    pub fn has_latency(&self) -> bool {
        self.profile.explicit(Knob::Delay).is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn neutral_profile_uses_defaults() {
        let p = ImpairmentProfile::new();
        assert!(p.is_neutral());
        assert_eq!(
            p.to_args(),
            [
                "-p",
                "1234",
                "-P",
                "12345",
                "-d",
                "0",
                "-j",
                "0",
                "-e",
                "0",
                "-c",
                "0",
                "-l",
                "0",
                "-s",
                "379097246178890316"
            ]
        );
    }

    #[test]
    fn composition_is_order_independent() {
        let loss = Impairment::loss(5);
        let latency = Impairment::latency(50, 30);

        let a = Impairment::compose([loss.clone(), latency.clone()]);
        let b = Impairment::compose([latency, loss]);

        assert_eq!(a.profile(), b.profile());
        let p = a.profile();
        assert_eq!(p.get(Knob::LossRate), 5);
        assert_eq!(p.get(Knob::Delay), 50);
        assert_eq!(p.get(Knob::Jitter), 30);
        for k in [Knob::ErrRate, Knob::CutRate, Knob::Port, Knob::ForwardPort, Knob::Seed] {
            assert_eq!(p.get(k), k.neutral(), "{}", k);
        }

        assert_eq!(a.name(), "loss_rate 5 latency 50 30");
        assert_eq!(b.name(), "latency 50 30 loss_rate 5");
    }

    #[test]
    fn merge_is_last_writer_wins() {
        let base = ImpairmentProfile::new()
            .set(Knob::Port, 4000)
            .set(Knob::LossRate, 1);
        let over = ImpairmentProfile::new().set(Knob::LossRate, 100);

        let merged = base.merge(&over);
        assert_eq!(merged.get(Knob::Port), 4000);
        assert_eq!(merged.get(Knob::LossRate), 100);
        assert_eq!(merged.sender_port(), 4000);
        assert_eq!(merged.receiver_port(), 12345);
    }

    #[test]
    fn unreliable_sets_every_impairment_knob() {
        let u = Impairment::unreliable();
        assert_eq!(
            u.name(),
            "latency 50 30 cut_rate 5 err_rate 5 loss_rate 5"
        );
        assert!(u.has_latency());
        let p = u.profile();
        assert_eq!(
            [Knob::ErrRate, Knob::CutRate, Knob::LossRate].map(|k| p.get(k)),
            [5, 5, 5]
        );
    }
}
