//! Interactive console abstraction for the supervised session.
//!
//! While the tunnel is active the lifecycle blocks on operator input,
//! looking for the literal `exit` command. Abstracting the input source lets
//! the state machine be tested without a terminal.

use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Future returned by console reads.
pub type ConsoleFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// Source of operator commands during the active session.
pub trait Console {
    /// Reads the next input line. `Ok(None)` signals end of input.
    fn read_command(&mut self) -> ConsoleFuture<'_, Option<String>>;
}

/// Console reading line-buffered commands from standard input.
#[derive(Debug)]
pub struct StdinConsole {
    lines: Lines<BufReader<Stdin>>,
    local_port: u16,
    banner_shown: bool,
}

impl StdinConsole {
    /// Creates a console announcing the proxy on `local_port`.
    #[must_use]
    pub fn new(local_port: u16) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            local_port,
            banner_shown: false,
        }
    }

    fn write_prompt(&mut self) -> io::Result<()> {
        let mut stderr = io::stderr();
        if !self.banner_shown {
            self.banner_shown = true;
            writeln!(
                stderr,
                "SOCKS5 proxy listening on 127.0.0.1:{}",
                self.local_port
            )?;
            writeln!(
                stderr,
                "Type 'exit' to close the tunnel and terminate the instance."
            )?;
        }
        write!(stderr, "burrow> ")?;
        stderr.flush()
    }
}

impl Console for StdinConsole {
    fn read_command(&mut self) -> ConsoleFuture<'_, Option<String>> {
        Box::pin(async move {
            self.write_prompt()?;
            self.lines.next_line().await
        })
    }
}
