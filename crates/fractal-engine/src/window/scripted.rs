use std::collections::VecDeque;

use crate::input::InputEvent;

use super::WindowBackend;

/// Window stand-in that hands out one queued batch of input per poll.
#[derive(Debug, Clone)]
pub struct ScriptedWindow {
    size: (u32, u32),
    batches: VecDeque<Vec<InputEvent>>,
    resizes: VecDeque<Option<(u32, u32)>>,
    ready: Vec<InputEvent>,
    pending_resize: Option<(u32, u32)>,
    close_requested: bool,
    close_when_drained: bool,
    polls: usize,
    presents: usize,
}

impl ScriptedWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            batches: VecDeque::new(),
            resizes: VecDeque::new(),
            ready: Vec::new(),
            pending_resize: None,
            close_requested: false,
            close_when_drained: false,
            polls: 0,
            presents: 0,
        }
    }

    /// Queues the events delivered by one future poll.
    pub fn push_batch(&mut self, events: impl IntoIterator<Item = InputEvent>) {
        self.batches.push_back(events.into_iter().collect());
        self.resizes.push_back(None);
    }

    /// Queues a poll that reports a framebuffer resize.
    pub fn push_resize(&mut self, width: u32, height: u32) {
        self.batches.push_back(Vec::new());
        self.resizes.push_back(Some((width, height)));
    }

    /// Reports `should_close` once every queued batch was polled.
    pub fn close_when_drained(mut self) -> Self {
        self.close_when_drained = true;
        self
    }

    pub fn poll_count(&self) -> usize {
        self.polls
    }

    pub fn present_count(&self) -> usize {
        self.presents
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }
}

impl WindowBackend for ScriptedWindow {
    fn should_close(&self) -> bool {
        self.close_requested || (self.close_when_drained && self.batches.is_empty())
    }

    fn poll_events(&mut self) {
        self.polls += 1;
        if let Some(batch) = self.batches.pop_front() {
            self.ready.extend(batch);
        }
        if let Some(Some(size)) = self.resizes.pop_front() {
            self.size = size;
            self.pending_resize = Some(size);
        }
    }

    fn present(&mut self) {
        self.presents += 1;
    }

    fn request_close(&mut self) {
        self.close_requested = true;
    }

    fn drain_input(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.ready)
    }

    fn take_resize(&mut self) -> Option<(u32, u32)> {
        self.pending_resize.take()
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Key, KeyAction};

    #[test]
    fn one_batch_per_poll() {
        let mut window = ScriptedWindow::new(64, 32);
        window.push_batch([InputEvent::key(Key::L, KeyAction::Press)]);
        window.push_batch([]);

        window.poll_events();
        assert_eq!(window.drain_input().len(), 1);
        window.poll_events();
        assert!(window.drain_input().is_empty());
        assert_eq!(window.poll_count(), 2);
    }

    #[test]
    fn resize_is_reported_once() {
        let mut window = ScriptedWindow::new(64, 32).close_when_drained();
        window.push_resize(128, 64);
        assert!(!window.should_close());

        window.poll_events();
        assert_eq!(window.take_resize(), Some((128, 64)));
        assert_eq!(window.take_resize(), None);
        assert_eq!(window.framebuffer_size(), (128, 64));
        assert!(window.should_close());
    }
}
