//! Terminal stand-ins for the phone's haptics, speaker and notification center.

use std::io::Write;

use tracing::info;
use wake_nav::alert::{AlertOutput, Notifier};
use wake_nav::policy::AlertModality;

pub struct TerminalAlert {
    bell: bool,
}

impl TerminalAlert {
    pub fn new(bell: bool) -> Self {
        Self { bell }
    }
}

impl AlertOutput for TerminalAlert {
    fn pulse(&self, modality: AlertModality) {
        match modality {
            AlertModality::Vibration => info!("alert: *bzzz*"),
            AlertModality::Sound => {
                info!("alert: *ding*");
                if self.bell {
                    let mut out = std::io::stdout();
                    let _ = out.write_all(b"\x07");
                    let _ = out.flush();
                }
            }
        }
    }
}

pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn post_local_notification(&self, title: &str, body: &str) {
        info!("notification posted: {:?}", title);
        println!("[{}] {}", title, body);
    }
}
