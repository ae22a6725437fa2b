//! Cycle based event queue.

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    RenderDone,
    PvrDmaDone,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScheduledEvent {
    /// Absolute cycle the event is due at
    pub cycle: u64,
    pub event: Event,
}

/// Events are kept sorted by due cycle; equal cycles keep insertion order.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    elapsed: u64,
    events: Vec<ScheduledEvent>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn schedule(&mut self, delay: u64, event: Event) {
        let cycle = self.elapsed + delay;
        let at = self.events.partition_point(|e| e.cycle <= cycle);
        self.events.insert(at, ScheduledEvent { cycle, event });
    }

    /// Drops every pending instance of `event`
    pub fn cancel(&mut self, event: Event) {
        self.events.retain(|e| e.event != event);
    }

    pub fn advance(&mut self, cycles: u64) {
        self.elapsed += cycles;
    }

    /// Removes and returns the next due event
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        match self.events.first() {
            Some(e) if e.cycle <= self.elapsed => Some(self.events.remove(0)),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_fire_in_order() {
        let mut s = Scheduler::new();
        s.schedule(100, Event::RenderDone);
        s.schedule(50, Event::PvrDmaDone);
        assert!(s.pop().is_none());

        s.advance(120);
        let first = s.pop().unwrap();
        assert_eq!(first.event, Event::PvrDmaDone);
        assert_eq!(s.elapsed() - first.cycle, 70);
        assert_eq!(s.pop().unwrap().event, Event::RenderDone);
        assert!(s.pop().is_none());
    }

    #[test]
    fn test_cancel() {
        let mut s = Scheduler::new();
        s.schedule(10, Event::RenderDone);
        s.schedule(10, Event::PvrDmaDone);
        s.cancel(Event::RenderDone);
        s.advance(10);
        assert_eq!(s.pop().unwrap().event, Event::PvrDmaDone);
        assert!(s.pop().is_none());
    }
}
