use conflux_core::msg::{AudioFrame, Cmd, CmdResult, Data, Msg, StatusCode, VideoFrame};

use crate::extension::{Extension, ExtensionEnv};

/// Answers every command with an OK result carrying the command's
/// properties, and forwards data and frames along its graph routes.
#[derive(Debug)]
pub struct EchoExtension {
    name: String,
    echoed: u64,
}

impl EchoExtension {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            echoed: 0,
        }
    }

    fn forwarded<M: Msg>(&self, msg: &mut M) {
        msg.set_dests(Vec::new());
        tracing::trace!(extension = %self.name, name = %msg.name(), "forwarding");
    }
}

impl Extension for EchoExtension {
    fn on_cmd(&mut self, env: &mut ExtensionEnv<'_>, cmd: Cmd) {
        self.echoed += 1;
        let mut result = CmdResult::for_cmd(StatusCode::Ok, &cmd);
        result.header_mut().properties.merge_from(cmd.properties().clone());
        if let Err(e) = env.return_result(result) {
            tracing::warn!(extension = %self.name, error = %e, "echo result not returned");
        }
    }

    fn on_data(&mut self, env: &mut ExtensionEnv<'_>, mut data: Data) {
        self.forwarded(&mut data);
        if let Err(e) = env.send_data(data) {
            tracing::debug!(extension = %self.name, error = %e, "data not forwarded");
        }
    }

    fn on_audio_frame(&mut self, env: &mut ExtensionEnv<'_>, mut frame: AudioFrame) {
        self.forwarded(&mut frame);
        if let Err(e) = env.send_audio_frame(frame) {
            tracing::debug!(extension = %self.name, error = %e, "audio frame not forwarded");
        }
    }

    fn on_video_frame(&mut self, env: &mut ExtensionEnv<'_>, mut frame: VideoFrame) {
        self.forwarded(&mut frame);
        if let Err(e) = env.send_video_frame(frame) {
            tracing::debug!(extension = %self.name, error = %e, "video frame not forwarded");
        }
    }

    fn on_deinit(&mut self, env: &mut ExtensionEnv<'_>) {
        tracing::debug!(extension = %self.name, echoed = self.echoed, "echo deinit");
        let _ = env.on_deinit_done();
    }
}
