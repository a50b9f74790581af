use std::io::Write;
use std::sync::{
    Arc, Mutex,
    atomic::AtomicBool,
};

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

// Trait to homogenize the progress tracking, so the dispatcher is not dependent on indicatif.
pub trait ProgressTracker: Send + Sync {
    fn interrupted(&self) -> Arc<AtomicBool>;
    /// Moves an item to `state`. Terminal states advance the "k of N" counter.
    fn set_item_state(&self, index: usize, state: ItemState);
    /// A result line for stdout.
    fn report(&self, line: &str);
    /// A warning line for stderr.
    fn warn(&self, line: &str);
    fn finish(&self, msg: &str);
    fn abandon(&self, msg: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Succeeded | ItemState::Failed)
    }
}

type Output = Box<dyn Write + Send>;

/// Draws on stderr. Result lines go to `out` (stdout by default) whether or
/// not the bar itself is visible.
#[derive(Clone)]
pub struct BatchProgressBar {
    bar: ProgressBar,
    items: Arc<Mutex<Vec<ItemState>>>,
    out: Arc<Mutex<Output>>,
    interrupted: Arc<AtomicBool>,
}

impl BatchProgressBar {
    pub fn new(total: usize, interrupted: Arc<AtomicBool>) -> Self {
        Self::with_output(
            total,
            interrupted,
            ProgressDrawTarget::stderr(),
            Box::new(std::io::stdout()),
        )
    }

    pub fn with_output(
        total: usize,
        interrupted: Arc<AtomicBool>,
        target: ProgressDrawTarget,
        out: Output,
    ) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total as u64), target);
        let style = ProgressStyle::with_template("{spinner:.green} {pos} of {len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Self {
            bar,
            items: Arc::new(Mutex::new(vec![ItemState::Pending; total])),
            out: Arc::new(Mutex::new(out)),
            interrupted,
        }
    }

    fn render_items(&self) -> String {
        const DONE_CHAR: &str = "█";
        const WAIT_CHAR: &str = "░";
        if let Ok(items) = self.items.lock() {
            let mut output = String::from("[");
            for item in items.iter() {
                let symbol = match item {
                    ItemState::Succeeded => DONE_CHAR.green(),
                    ItemState::Failed => DONE_CHAR.red(),
                    ItemState::InFlight => DONE_CHAR.yellow(),
                    ItemState::Pending => WAIT_CHAR.bright_black(),
                };
                output.push_str(&symbol.to_string());
            }
            output.push(']');
            output
        } else {
            String::from("[?]")
        }
    }
}

impl ProgressTracker for BatchProgressBar {
    fn interrupted(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    fn set_item_state(&self, index: usize, state: ItemState) {
        if let Ok(mut items) = self.items.lock() {
            if let Some(slot) = items.get_mut(index) {
                // First terminal state wins.
                if slot.is_terminal() {
                    return;
                }
                *slot = state;
            }
        }
        if state.is_terminal() {
            self.bar.inc(1);
        }
        self.bar.set_message(self.render_items());
    }

    fn report(&self, line: &str) {
        self.bar.suspend(|| {
            if let Ok(mut out) = self.out.lock() {
                // A closed stdout (e.g. `| head`) must not abort the batch.
                let _ = writeln!(out, "{line}").and_then(|()| out.flush());
            }
        });
    }

    fn warn(&self, line: &str) {
        self.bar.suspend(|| eprintln!("{}", line.yellow()));
    }

    fn finish(&self, msg: &str) {
        self.bar.finish_with_message(format!("{} {msg}", self.render_items()));
    }

    fn abandon(&self, msg: &str) {
        self.bar
            .abandon_with_message(format!("{} {}", self.render_items(), msg.red()));
    }
}
