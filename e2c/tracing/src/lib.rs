// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

/// Emit an event that conforms to a flat event structure type using the [tracing::event!](https://github.com/tokio-rs/tracing/blob/908cc432a5994f6e17c8f36e13c217dc40085704/tracing/src/macros.rs#L854) macro.
///
/// There should be a [Subscriber](https://docs.rs/tracing/latest/tracing/trait.Subscriber.html) in the application root to check the
/// [Metadata::name](https://docs.rs/tracing/latest/tracing/struct.Metadata.html#method.name) of the event in the
/// [Event::metadata](https://docs.rs/tracing/latest/tracing/struct.Event.html#method.metadata).
///
/// The emitted [tracing::Event] will contain the name of the event twice:
/// in the [tracing::metadata::Metadata::name] field as `"event::<name>"` and under the `event` key in the [tracing::field::ValueSet].
/// This lets a subscriber filter on `name`, or on the `event::` prefix to catch everything this macro emits.
///
/// ### Example
///
/// ```ignore
/// pub struct BlockCommitted<'a> {
///     pub height: u32,
///     pub block_hash: &'a str,
/// }
///
/// emit!(BlockCommitted {
///     height: 3,
///     block_hash: "abcd",
/// });
/// ```
#[macro_export]
macro_rules! emit {
    ($lvl:ident, $event:ident { $($field:ident $(: $value:expr)?),* $(,)? } ) => {{
        // Make sure the emitted fields match the schema of the event.
        if false {
            let _event = $event {
                $($field $(: $value)?),*
            };
        }
        tracing::event!(
            name: concat!("event::", stringify!($event)),
            tracing::Level::$lvl,
            { event = tracing::field::display(stringify!($event)), $($field $(= $value)?),* }
        )
    }};

    ($event:ident { $($field:ident $(: $value:expr)?),* $(,)? } ) => {{
        emit!(INFO, $event { $($field $(: $value)? ),* })
    }};
}

#[cfg(test)]
mod tests {

    #[allow(dead_code)]
    struct TestEvent<'a> {
        pub foo: u32,
        pub bar: &'a str,
    }

    #[test]
    fn test_emit() {
        emit!(TestEvent {
            foo: 123,
            bar: "spam",
        });
    }
}
