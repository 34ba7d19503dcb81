//! Next-frame scheduling.
//!
//! Work requested during frame N runs in frame N+1, never in the frame that
//! requested it. Each frame takes the whole queue first, so anything a
//! continuation requests lands in the following frame.

#[derive(Debug)]
pub struct FrameQueue<T> {
    pending: Vec<T>,
    frame: u64,
}

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            frame: 0,
        }
    }

    /// Schedule `task` for the next frame.
    pub fn request(&mut self, task: T) {
        self.pending.push(task);
    }

    /// Start a new frame: returns every task requested before it, in
    /// request order.
    pub fn take_due(&mut self) -> Vec<T> {
        self.frame += 1;
        std::mem::take(&mut self.pending)
    }

    /// Drop every scheduled task.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of frames started so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_requested_during_a_frame_wait_for_the_next() {
        let mut q = FrameQueue::new();
        q.request(1);
        let due = q.take_due();
        assert_eq!(due, vec![1]);
        q.request(2);
        assert_eq!(q.frame(), 1);
        assert_eq!(q.take_due(), vec![2]);
        assert!(q.take_due().is_empty());
        assert_eq!(q.frame(), 3);
    }

    #[test]
    fn cancel_drops_everything() {
        let mut q = FrameQueue::new();
        q.request("a");
        q.request("b");
        q.cancel_all();
        assert!(q.is_idle());
        assert!(q.take_due().is_empty());
    }
}
