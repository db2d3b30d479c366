//! PeerLink message model: one logical event exchanged between two peers.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Event payload: arbitrary JSON object.
pub type Data = Map<String, Value>;

/// A single message on the wire. Encoding is JSON; framing is length-prefix (see wire module).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Event name, e.g. `call_start`. Not restricted to [`Event`] names.
    pub event: String,
    /// Event data. Missing or `null` on the wire decodes as an empty object.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Data,
    /// Seconds since the Unix epoch at construction time.
    pub timestamp: f64,
}

impl Message {
    /// Build a message stamped with the current wall-clock time.
    pub fn new(event: impl Into<String>, data: Data) -> Self {
        Self::with_timestamp(event, data, unix_now())
    }

    pub fn with_timestamp(event: impl Into<String>, data: Data, timestamp: f64) -> Self {
        Self {
            event: event.into(),
            data,
            timestamp,
        }
    }

    /// True if `filter` is `None` or names this message's event.
    pub fn matches(&self, filter: Option<&str>) -> bool {
        filter.map_or(true, |event| self.event == event)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Data, D::Error> {
    Ok(Option::<Data>::deserialize(d)?.unwrap_or_default())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Predefined events used by test scenarios. Any other string is still a valid event name.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Event {
    Init,
    Stop,
    Ready,
    CallStart,
    CallRinging,
    CallAnswer,
    CallEnd,
    CallReject,
    AudioStart,
    AudioStop,
    VideoStart,
    VideoStop,
    Message,
    Data,
    Custom,
}

impl Event {
    pub const ALL: [Event; 15] = [
        Event::Init,
        Event::Stop,
        Event::Ready,
        Event::CallStart,
        Event::CallRinging,
        Event::CallAnswer,
        Event::CallEnd,
        Event::CallReject,
        Event::AudioStart,
        Event::AudioStop,
        Event::VideoStart,
        Event::VideoStop,
        Event::Message,
        Event::Data,
        Event::Custom,
    ];

    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Init => "init",
            Event::Stop => "stop",
            Event::Ready => "ready",
            Event::CallStart => "call_start",
            Event::CallRinging => "call_ringing",
            Event::CallAnswer => "call_answer",
            Event::CallEnd => "call_end",
            Event::CallReject => "call_reject",
            Event::AudioStart => "audio_start",
            Event::AudioStop => "audio_stop",
            Event::VideoStart => "video_start",
            Event::VideoStop => "video_stop",
            Event::Message => "message",
            Event::Data => "data",
            Event::Custom => "custom",
        }
    }

    /// Case-insensitive lookup; unknown names map to [`Event::Custom`].
    pub fn from_name(name: &str) -> Event {
        name.parse().unwrap_or(Event::Custom)
    }
}

impl AsRef<str> for Event {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<Event> for String {
    fn from(e: Event) -> Self {
        e.as_str().to_string()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an [`Event`] from a name that is not predefined.
#[derive(Debug, thiserror::Error)]
#[error("unknown event: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for Event {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Event::ALL
            .iter()
            .copied()
            .find(|e| e.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_message_is_timestamped() {
        let m = Message::new(Event::Ready, Data::new());
        assert_eq!(m.event, "ready");
        assert!(m.data.is_empty());
        assert!(m.timestamp > 1_600_000_000.0);
    }

    #[test]
    fn filter_matching() {
        let m = Message::with_timestamp("call_start", Data::new(), 1.0);
        assert!(m.matches(None));
        assert!(m.matches(Some("call_start")));
        assert!(!m.matches(Some("call_end")));
        assert!(!m.matches(Some("CALL_START")));
    }

    #[test]
    fn event_names() {
        assert_eq!(Event::CallAnswer.as_str(), "call_answer");
        assert_eq!("CALL_ANSWER".parse::<Event>().unwrap(), Event::CallAnswer);
        assert_eq!(Event::from_name("video_stop"), Event::VideoStop);
        assert_eq!(Event::from_name("something_else"), Event::Custom);
        assert!("nope".parse::<Event>().is_err());
        for e in Event::ALL {
            assert_eq!(Event::from_name(e.as_str()), e);
        }
    }

    #[test]
    fn missing_data_defaults_to_empty() {
        let m: Message = serde_json::from_value(json!({"event": "ready", "timestamp": 2.5})).unwrap();
        assert!(m.data.is_empty());
        assert_eq!(m.timestamp, 2.5);
    }

    #[test]
    fn null_data_decodes_as_empty() {
        let m: Message =
            serde_json::from_value(json!({"event": "ready", "data": null, "timestamp": 1.0})).unwrap();
        assert!(m.data.is_empty());
        let bad = serde_json::from_value::<Message>(json!({"event": "ready", "data": [1], "timestamp": 1.0}));
        assert!(bad.is_err());
    }
}
