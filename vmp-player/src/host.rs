//! Host frame synchronization
//!
//! [`FrameSync`] is the host's once-per-frame primitive. Before each
//! presentation it runs every registered pre-sync task (one per player),
//! then raises [`FrameSync::on_present`]. Notifications raised by the tasks
//! therefore always land before the frame is presented.
//!
//! Tasks are held weakly: dropping a player removes its task, and the
//! registration is pruned on the next synchronization.

use crate::playback::MoviePlayer;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};
use vmp_common::events::Event;

/// Work run in the pre-synchronization phase of every frame
pub trait FrameTask {
    fn before_sync(&mut self);
}

impl FrameTask for MoviePlayer {
    fn before_sync(&mut self) {
        self.tick();
    }
}

/// Registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

struct Registration {
    id: TaskId,
    task: Weak<RefCell<dyn FrameTask>>,
}

/// Once-per-frame synchronization point
pub struct FrameSync {
    tasks: Vec<Registration>,
    next_id: u64,
    frame: u64,

    /// Raised after the pre-sync tasks with the number of the frame being
    /// presented
    pub on_present: Event<u64>,
}

impl FrameSync {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 0,
            frame: 0,
            on_present: Event::new(),
        }
    }

    /// Register a pre-sync task
    ///
    /// Registering the same task twice returns the existing handle.
    pub fn register<T: FrameTask + 'static>(&mut self, task: &Rc<RefCell<T>>) -> TaskId {
        let task: Rc<RefCell<dyn FrameTask>> = task.clone();
        let weak = Rc::downgrade(&task);

        if let Some(existing) = self.tasks.iter().find(|r| r.task.ptr_eq(&weak)) {
            return existing.id;
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.push(Registration { id, task: weak });
        id
    }

    /// Remove a task; returns `true` if it was registered
    pub fn unregister(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|r| r.id != id);
        self.tasks.len() != before
    }

    /// Take ownership of a player and tick it once per frame
    pub fn attach(&mut self, player: MoviePlayer) -> Rc<RefCell<MoviePlayer>> {
        let player = Rc::new(RefCell::new(player));
        self.register(&player);
        debug!("Attached player {} to frame sync", player.borrow().id());
        player
    }

    /// Run the pre-sync tasks, then present; returns the presented frame number
    pub fn synchronize(&mut self) -> u64 {
        self.tasks.retain(|r| r.task.strong_count() > 0);

        let live: Vec<Rc<RefCell<dyn FrameTask>>> =
            self.tasks.iter().filter_map(|r| r.task.upgrade()).collect();
        for task in live {
            match task.try_borrow_mut() {
                Ok(mut task) => task.before_sync(),
                Err(_) => warn!("Skipping pre-sync task that is already borrowed"),
            }
        }

        self.frame += 1;
        let mut frame = self.frame;
        self.on_present.invoke(&mut frame);
        self.frame
    }

    /// Number of live registrations
    pub fn task_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.task.strong_count() > 0).count()
    }

    /// Frames presented so far
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl Default for FrameSync {
    fn default() -> Self {
        Self::new()
    }
}
