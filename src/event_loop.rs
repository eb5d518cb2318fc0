use std::io;
use std::time::Duration;

use crossterm::event::Event;

use crate::drivers::InputDriver;

pub enum ControlFlow {
    Continue,
    Quit,
}

/// Drives the UI thread.
///
/// The handler is called with `None` once per poll interval (time to pump the
/// UI queue, advance timers and redraw) and with `Some(event)` for every input
/// event. Bursts of events, such as a mouse drag, are drained before the next
/// tick so the window follows the pointer without lag.
pub struct EventLoop<D> {
    driver: D,
    poll_interval: Duration,
}

impl<D: InputDriver> EventLoop<D> {
    pub fn new(driver: D, poll_interval: Duration) -> Self {
        Self {
            driver,
            poll_interval,
        }
    }

    pub fn run<F>(&mut self, mut handler: F) -> io::Result<()>
    where
        F: FnMut(Option<Event>) -> io::Result<ControlFlow>,
    {
        loop {
            if let ControlFlow::Quit = handler(None)? {
                return Ok(());
            }
            if self.driver.poll(self.poll_interval)? {
                loop {
                    let event = self.driver.read()?;
                    if let ControlFlow::Quit = handler(Some(event))? {
                        return Ok(());
                    }
                    if !self.driver.poll(Duration::ZERO)? {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Event>);

    impl InputDriver for Scripted {
        fn poll(&mut self, _timeout: Duration) -> io::Result<bool> {
            Ok(!self.0.is_empty())
        }

        fn read(&mut self) -> io::Result<Event> {
            self.0
                .pop_front()
                .ok_or_else(|| io::Error::other("script exhausted"))
        }
    }

    fn key(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    #[test]
    fn burst_is_drained_before_next_tick() {
        let script = Scripted(VecDeque::from([key('a'), key('b'), key('q')]));
        let mut event_loop = EventLoop::new(script, Duration::from_millis(1));
        let mut seen = Vec::new();
        event_loop
            .run(|event| {
                let Some(Event::Key(k)) = event else {
                    seen.push('.');
                    return Ok(ControlFlow::Continue);
                };
                let KeyCode::Char(c) = k.code else {
                    return Ok(ControlFlow::Continue);
                };
                seen.push(c);
                Ok(if c == 'q' {
                    ControlFlow::Quit
                } else {
                    ControlFlow::Continue
                })
            })
            .unwrap();
        assert_eq!(seen, vec!['.', 'a', 'b', 'q']);
    }
}
