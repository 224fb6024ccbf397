use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("confab.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("confab.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("confab.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("confab.stream.events");
pub(crate) static STREAM_EMPTY_EVENTS: Counter = Counter::new("confab.stream.empty_events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("confab.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("confab.stream.bytes");

pub(crate) static DIALOGUE_TURNS: Counter = Counter::new("confab.dialogue.turns");
pub(crate) static DIALOGUE_FAILED_TURNS: Counter = Counter::new("confab.dialogue.failed_turns");
pub(crate) static DIALOGUE_TURN_DURATION: Moments =
    Moments::new("confab.dialogue.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_EMPTY_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&DIALOGUE_TURNS);
    collector.register_counter(&DIALOGUE_FAILED_TURNS);
    collector.register_moments(&DIALOGUE_TURN_DURATION);
}
