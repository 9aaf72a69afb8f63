use crate::err::Result;
use crate::handler::Handler;
use crate::mail::Mail;
use log::debug;
use std::fs;
use std::fs::File;
use std::io;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[cfg(unix)]
const CREATE_MODE: u32 = 0o700;

/// A handler that saves mail into a maildir. For how mail is retrieved from
/// a maildir refer to <http://cr.yp.to/proto/maildir.html>.
///
/// Each message is written to a fresh uniquely named file under `tmp/` and
/// then moved into `new/`, so readers never observe a partial delivery.
pub struct Maildir {
    // where the maildir structure starts
    directory: PathBuf,
}

impl Maildir {
    /// Open a maildir at the given location, creating the `tmp/`, `new/`
    /// and `cur/` structure if it does not exist yet.
    pub fn new<P>(directory: P) -> Result<Self>
    where
        P: Into<PathBuf>,
    {
        let maildir = Self {
            directory: directory.into(),
        };
        maildir.create()?;
        Ok(maildir)
    }

    fn create(&self) -> io::Result<()> {
        for sub in ["tmp", "new", "cur"] {
            let dir = self.directory.join(sub);
            fs::create_dir_all(&dir)?;
            #[cfg(unix)]
            fs::set_permissions(&dir, fs::Permissions::from_mode(CREATE_MODE))?;
        }
        Ok(())
    }

    // Store a message under tmp/ and return its path.
    fn store_tmp<R: Read>(&self, reader: &mut R) -> io::Result<PathBuf> {
        let path = self.directory.join("tmp").join(unique_name());
        let mut file = File::create(&path)?;
        #[cfg(unix)]
        file.set_permissions(fs::Permissions::from_mode(CREATE_MODE))?;
        let num_bytes = io::copy(reader, &mut file)?;
        debug!("maildir: saved {} bytes into {}", num_bytes, path.display());
        Ok(path)
    }

    // Move a stored message from tmp/ into new/, where readers pick it up.
    fn deliver(&self, tmp_path: &Path) -> io::Result<PathBuf> {
        let filename = tmp_path
            .file_name()
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
        let mut delivered = filename.to_os_string();
        delivered.push(":2,");
        let dest = self.directory.join("new").join(delivered);
        fs::rename(tmp_path, &dest)?;
        Ok(dest)
    }
}

impl Handler for Maildir {
    fn handle_mail(&self, mail: &Mail) -> Result<u16> {
        let mut reader = mail.raw_reader();
        let tmp_path = self.store_tmp(&mut reader)?;
        self.deliver(&tmp_path)?;
        Ok(250)
    }
}

fn unique_name() -> String {
    let unix_nano = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    format!("{}.{}.{}", unix_nano, process::id(), host)
}
