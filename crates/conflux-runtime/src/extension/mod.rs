//! Extensions and extension groups, the env handed to their callbacks, and
//! the per-group thread that runs them.

pub mod env;
pub mod group;
pub mod proxy;
pub(crate) mod thread;

use std::sync::Arc;

use conflux_core::msg::{AudioFrame, Cmd, CmdResult, Data, StatusCode, VideoFrame};

pub use env::ExtensionEnv;
pub use group::{ExtensionGroup, ExtensionGroupEnv};
pub use proxy::{EnvProxy, NotifyJob, NotifyMode};

/// Called on the sender's thread for each result of a command it sent.
pub type ResultHandler = Arc<dyn Fn(&mut ExtensionEnv<'_>, CmdResult) + Send + Sync>;

/// A unit of behavior in the graph.
///
/// Every callback runs on the thread of the extension's group, one at a
/// time. Lifecycle callbacks must be acknowledged through the matching
/// `env.on_*_done()`, during the callback or later; the defaults
/// acknowledge at once.
pub trait Extension: Send {
    fn on_configure(&mut self, env: &mut ExtensionEnv<'_>) {
        let _ = env.on_configure_done();
    }

    fn on_init(&mut self, env: &mut ExtensionEnv<'_>) {
        let _ = env.on_init_done();
    }

    fn on_start(&mut self, env: &mut ExtensionEnv<'_>) {
        let _ = env.on_start_done();
    }

    fn on_stop(&mut self, env: &mut ExtensionEnv<'_>) {
        let _ = env.on_stop_done();
    }

    fn on_deinit(&mut self, env: &mut ExtensionEnv<'_>) {
        let _ = env.on_deinit_done();
    }

    /// Answers with an OK final result unless overridden.
    fn on_cmd(&mut self, env: &mut ExtensionEnv<'_>, cmd: Cmd) {
        let _ = env.return_result(CmdResult::for_cmd(StatusCode::Ok, &cmd));
    }

    fn on_data(&mut self, _env: &mut ExtensionEnv<'_>, _data: Data) {}

    fn on_audio_frame(&mut self, _env: &mut ExtensionEnv<'_>, _frame: AudioFrame) {}

    fn on_video_frame(&mut self, _env: &mut ExtensionEnv<'_>, _frame: VideoFrame) {}
}
