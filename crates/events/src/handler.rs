use crate::Event;

/// Consumes events delivered through a bus subscription.
///
/// Handlers must tolerate duplicate delivery (the bus is at-least-once) and
/// must not assume ordering across publishers. Errors are the handler's own
/// business: a consumer that can fail (e.g. a mailer) should log and move on
/// rather than poison the subscription loop.
pub trait EventHandler<E: Event> {
    fn on_event(&self, event: &E);
}

/// Execute an aggregate command deterministically (no IO, no async).
///
/// The canonical lifecycle in one step:
///
/// 1. **Decide**: `aggregate.handle(command)` returns events (pure).
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`.
///
/// The aggregate maintains its own version tracking during `apply` (+1 per
/// event). Persistence and publication are the caller's concern.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: accord_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
