use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// プッシュ中のスピナー（stderr に描画）
pub struct PushProgress {
    progress_bar: ProgressBar,
}

impl PushProgress {
    pub fn new(tag: &str) -> Self {
        let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(format!("Pushing {}...", tag));
        pb.enable_steady_tick(Duration::from_millis(120));

        Self { progress_bar: pb }
    }

    pub fn set_message(&self, msg: &str) {
        self.progress_bar.set_message(msg.to_string());
    }

    /// スピナーを崩さずに 1 行出力する（端末でない場合はそのまま stderr へ）
    pub fn println(&self, line: &str) {
        if self.progress_bar.is_hidden() {
            eprintln!("{}", line);
        } else {
            self.progress_bar.println(line);
        }
    }

    pub fn finish_success(&self, tag: &str) {
        self.progress_bar
            .finish_with_message(format!("Pushed {} ✓", tag));
    }

    pub fn finish_error(&self, error: &str) {
        self.progress_bar
            .abandon_with_message(format!("Push failed: {}", error));
    }
}
