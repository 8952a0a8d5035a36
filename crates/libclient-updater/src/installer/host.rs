// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{Error, Result};

/// Interaction with the application hosting the update pipeline.
pub trait HostHooks: Send + Sync {
    /// Lets a freshly started instance run while this one is shutting down.
    fn release_single_instance_lock(&self);

    fn copy_to_clipboard(&self, text: &str) -> Result<()>;

    /// Ends the current process. The installer takes over from here.
    fn quit(&self);
}

/// Default hooks for a standalone process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl HostHooks for SystemHost {
    fn release_single_instance_lock(&self) {
        log::debug!(target: "install", "no single instance lock held");
    }

    fn copy_to_clipboard(&self, text: &str) -> Result<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| Error::other(format!("clipboard unavailable: {e}")))?;
        clipboard
            .set_text(text)
            .map_err(|e| Error::other(format!("failed to copy to clipboard: {e}")))
    }

    fn quit(&self) {
        log::info!(target: "install", "quitting for the update installer");
        std::process::exit(0);
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use parking_lot::Mutex;

    use super::*;

    /// Records every hook invocation.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub calls: Mutex<Vec<String>>,
        pub clipboard: Mutex<Option<String>>,
    }

    impl HostHooks for RecordingHost {
        fn release_single_instance_lock(&self) {
            self.calls.lock().push("release-lock".to_string());
        }

        fn copy_to_clipboard(&self, text: &str) -> Result<()> {
            self.calls.lock().push("clipboard".to_string());
            *self.clipboard.lock() = Some(text.to_string());
            Ok(())
        }

        fn quit(&self) {
            self.calls.lock().push("quit".to_string());
        }
    }
}
