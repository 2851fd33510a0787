//! Security module
//!
//! Credential storage and echo-free terminal input for secrets.

pub mod credentials;

use anyhow::Result;
use std::io::Write;

// Re-export commonly used types
pub use credentials::{CredentialStore, Credentials, EncodedSecret, MailAccount, PortalLogin};

/// Prompt on stderr and read one line from stdin with echo disabled
pub fn prompt_secret(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    std::io::stderr().flush()?;
    read_hidden_line()
}

fn read_hidden_line() -> Result<String> {
    #[cfg(unix)]
    {
        use std::io::BufRead;
        // Disable echo
        let fd = 0; // stdin
        unsafe {
            let mut termios: libc::termios = std::mem::zeroed();
            let has_tty = libc::tcgetattr(fd, &mut termios) == 0;
            let original = termios;
            if has_tty {
                termios.c_lflag &= !libc::ECHO;
                libc::tcsetattr(fd, libc::TCSANOW, &termios);
            }

            let mut line = String::new();
            let result = std::io::stdin().lock().read_line(&mut line);

            // Restore echo
            if has_tty {
                libc::tcsetattr(fd, libc::TCSANOW, &original);
            }
            eprintln!(); // newline after hidden input

            result?;
            Ok(line.trim().to_string())
        }
    }
    #[cfg(not(unix))]
    {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}
