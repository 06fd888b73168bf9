use crossterm::event::KeyEvent;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};

use crate::model::entry::Forest;
use crate::notice::{Notice, Reporter, log_notice};

/// All possible messages that drive picker state transitions.
#[derive(Debug)]
pub enum Msg {
    // -- Input events (raw)
    Key(KeyEvent),
    Resize(u16, u16),

    // -- Forester
    ForestLoaded(Arc<Forest>),
    TreeCreated(Option<PathBuf>),
    Notice(Notice),

    // -- System
    Tick,
}

impl Reporter for mpsc::Sender<Msg> {
    fn report(&self, notice: Notice) {
        log_notice(&notice);
        let _ = self.send(Msg::Notice(notice));
    }
}
