mod journal;
mod local_state;
mod proctoring_events;
mod sessions;
