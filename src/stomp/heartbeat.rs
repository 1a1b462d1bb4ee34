//! STOMP heart-beat header handling and interval negotiation.

use std::fmt;
use std::time::Duration;

use super::DecodeError;

/// A pair of heart-beat intervals as carried by the `heart-beat` header.
///
/// `outgoing` is how often this side promises to send traffic, `incoming`
/// is how often it wants to receive traffic. A zero duration means "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Interval at which the sender promises to emit something.
    pub outgoing: Duration,
    /// Interval at which the sender wants to receive something.
    pub incoming: Duration,
}

impl HeartBeat {
    /// Heart-beating disabled in both directions.
    pub const DISABLED: Self = Self {
        outgoing: Duration::ZERO,
        incoming: Duration::ZERO,
    };

    /// Creates a heart-beat pair from millisecond values.
    #[must_use]
    pub const fn from_millis(outgoing: u64, incoming: u64) -> Self {
        Self {
            outgoing: Duration::from_millis(outgoing),
            incoming: Duration::from_millis(incoming),
        }
    }

    /// Parses a `heart-beat` header value (`"<cx>,<cy>"`, milliseconds).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedHeader`] if the value is not two
    /// comma-separated unsigned integers.
    pub fn parse(value: &str) -> Result<Self, DecodeError> {
        let malformed = || DecodeError::MalformedHeader(format!("heart-beat:{value}"));
        let (out, inc) = value.split_once(',').ok_or_else(malformed)?;
        let outgoing: u64 = out.trim().parse().map_err(|_| malformed())?;
        let incoming: u64 = inc.trim().parse().map_err(|_| malformed())?;
        Ok(Self::from_millis(outgoing, incoming))
    }

    /// Combines the client's request with the server's `CONNECTED` answer.
    ///
    /// Follows STOMP 1.2: a direction is active only when both sides agree
    /// to it, and then runs at the slower of the two intervals.
    #[must_use]
    pub fn negotiate(client: Self, server: Self) -> Self {
        Self {
            outgoing: agreed(client.outgoing, server.incoming),
            incoming: agreed(client.incoming, server.outgoing),
        }
    }
}

fn agreed(ours: Duration, theirs: Duration) -> Duration {
    if ours.is_zero() || theirs.is_zero() {
        Duration::ZERO
    } else {
        ours.max(theirs)
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            self.outgoing.as_millis(),
            self.incoming.as_millis()
        )
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn display_is_header_value() {
        assert_eq!(HeartBeat::from_millis(10_000, 5_000).to_string(), "10000,5000");
    }

    #[test]
    fn parse_accepts_whitespace() {
        let Ok(hb) = HeartBeat::parse("0, 4000") else {
            panic!("expected valid heart-beat");
        };
        assert_eq!(hb, HeartBeat::from_millis(0, 4_000));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(HeartBeat::parse("fast").is_err());
        assert!(HeartBeat::parse("1,x").is_err());
    }

    #[test]
    fn negotiate_takes_slower_interval() {
        let client = HeartBeat::from_millis(10_000, 10_000);
        let server = HeartBeat::from_millis(20_000, 5_000);
        let agreed = HeartBeat::negotiate(client, server);
        assert_eq!(agreed.outgoing, Duration::from_millis(10_000));
        assert_eq!(agreed.incoming, Duration::from_millis(20_000));
    }

    #[test]
    fn negotiate_zero_disables_direction() {
        let client = HeartBeat::from_millis(10_000, 0);
        let server = HeartBeat::from_millis(5_000, 0);
        assert_eq!(HeartBeat::negotiate(client, server), HeartBeat::DISABLED);
    }
}
