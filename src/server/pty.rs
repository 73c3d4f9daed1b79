use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;

/// A shell process attached to a pseudo-terminal.
pub struct PtyProcess {
    /// Master file descriptor of the PTY, non-blocking.
    master_fd: OwnedFd,
    child_pid: libc::pid_t,
    reaped: bool,
}

impl PtyProcess {
    /// Spawn `program` with `args` under a fresh PTY.
    ///
    /// The child starts in `cwd` with the given environment overrides
    /// applied on top of the inherited environment. Kernel echo is cleared
    /// on the child's terminal: the shell (PSReadLine) does its own
    /// echoing and highlighting, and leaving both on doubles every
    /// character.
    pub fn spawn(
        cols: u16,
        rows: u16,
        program: &str,
        args: &[String],
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<Self, std::io::Error> {
        let mut master_fd: libc::c_int = 0;

        let mut win_size = libc::winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // All CStrings are built before forking so the child only execs.
        let program_c = CString::new(program)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let args_c: Vec<CString> = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .map(CString::new)
            .collect::<Result<_, _>>()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let env_c: Vec<CString> = env
            .iter()
            .map(|(key, value)| CString::new(format!("{key}={value}")))
            .collect::<Result<_, _>>()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let cwd_c = CString::new(cwd.to_string_lossy().as_bytes().to_vec())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        unsafe {
            let child_pid = libc::forkpty(
                &mut master_fd,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut win_size,
            );

            if child_pid < 0 {
                return Err(std::io::Error::last_os_error());
            }

            if child_pid == 0 {
                // Child: fd 0/1/2 are the PTY slave.
                let mut attrs: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(0, &mut attrs) == 0 {
                    attrs.c_lflag &= !libc::ECHO;
                    libc::tcsetattr(0, libc::TCSANOW, &attrs);
                }

                libc::chdir(cwd_c.as_ptr());
                for entry in &env_c {
                    libc::putenv(entry.as_ptr() as *mut _);
                }

                let args_ptrs: Vec<*const libc::c_char> = args_c
                    .iter()
                    .map(|s| s.as_ptr())
                    .chain(std::iter::once(std::ptr::null()))
                    .collect();
                libc::execvp(program_c.as_ptr(), args_ptrs.as_ptr());
                libc::_exit(1);
            }

            // Parent: master side goes non-blocking for the poll loop.
            let flags = libc::fcntl(master_fd, libc::F_GETFL);
            libc::fcntl(master_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);

            Ok(Self {
                master_fd: OwnedFd::from_raw_fd(master_fd),
                child_pid,
                reaped: false,
            })
        }
    }

    /// Set the PTY window size.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), std::io::Error> {
        let win_size = libc::winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let result =
            unsafe { libc::ioctl(self.master_fd.as_raw_fd(), libc::TIOCSWINSZ, &win_size) };
        if result < 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Write input bytes to the shell.
    pub fn write(&self, data: &[u8]) -> Result<(), std::io::Error> {
        let fd = self.master_fd.as_raw_fd();
        let result =
            unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
        if result < 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Read any available shell output. Empty when nothing is pending.
    pub fn read(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = vec![0u8; 65536];
        let fd = self.master_fd.as_raw_fd();
        let result =
            unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if result > 0 {
            buf.truncate(result as usize);
            Ok(buf)
        } else if result == 0 {
            Ok(Vec::new())
        } else {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                Ok(Vec::new())
            } else {
                Err(err)
            }
        }
    }

    /// Non-blocking check for child exit. Returns the raw wait status once.
    pub fn try_wait(&mut self) -> Option<i32> {
        if self.reaped {
            return None;
        }
        let mut status: libc::c_int = 0;
        let waited = unsafe { libc::waitpid(self.child_pid, &mut status, libc::WNOHANG) };
        if waited == self.child_pid {
            self.reaped = true;
            Some(status)
        } else {
            None
        }
    }

    pub fn child_pid(&self) -> libc::pid_t {
        self.child_pid
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        unsafe {
            libc::kill(self.child_pid, libc::SIGTERM);

            let mut status: libc::c_int = 0;
            let waited = libc::waitpid(self.child_pid, &mut status, libc::WNOHANG);
            if waited == 0 {
                // Still running: short grace, then force kill and reap.
                std::thread::sleep(std::time::Duration::from_millis(100));
                let waited2 = libc::waitpid(self.child_pid, &mut status, libc::WNOHANG);
                if waited2 == 0 {
                    libc::kill(self.child_pid, libc::SIGKILL);
                    libc::waitpid(self.child_pid, &mut status, 0);
                }
            }
        }
    }
}
