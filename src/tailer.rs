use std::{
    fs::{self, File, Metadata},
    io::{self, Read, Seek, SeekFrom},
    path::Path,
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use tracing::{debug, trace, warn};

use crate::{
    identity::{identity_changed, FileIdentity},
    LineBuffer, TailerConfig, TailerError, TailerHandle, TailerListener,
};

/// Polling follower of a single file that hands every appended line to a `TailerListener`.
///
/// ## Usage
///
/// `Tailer` does not own a thread. `run` blocks until `stop` is requested, so either give it a thread
/// of its own or use `Tailer::spawn`, which does exactly that.
///
/// ```rust no_run
/// # use std::time::Duration;
/// # use filetail::{Tailer, TailerConfig, TailerListener};
/// struct Printer;
///
/// impl TailerListener for Printer {
///     fn on_new_line(&mut self, line: String) {
///         println!("{line}");
///     }
/// }
///
/// let config = TailerConfig::new("/var/log/mail.log").poll_interval(Duration::from_millis(500));
/// let (handle, thread) = Tailer::spawn(config, Printer)?;
/// std::thread::sleep(Duration::from_secs(10));
/// handle.stop();
/// thread.join().unwrap();
/// # Ok::<(), filetail::TailerError>(())
/// ```
///
/// ## Working principles
///
/// Every poll interval the path is stat'ed and compared to the file currently held open:
///
/// * path is missing: lines still unread in the held handle are delivered, then the handle is dropped and
/// `on_file_not_found` is reported once. When the file shows up again it is reported as rotated and read
/// from its beginning, since all of it was written after the old file was gone.
/// * path points to another inode: lines left in the old file are delivered, then rotation is reported and
/// the new file is read from its beginning.
/// * file became shorter than what was already read: it was truncated, rotation is reported and reading
/// starts over from zero.
/// * file has the same size but a newer modification time and its first bytes differ from what we saw: it
/// was rewritten in place, rotation is reported and reading starts over from zero. A bare `touch` keeps the
/// first bytes and is ignored.
/// * file grew: new bytes are read in `buffer_size` chunks and complete lines are delivered. An unterminated
/// tail waits in memory for the rest of its line.
///
/// ## Limitations
///
/// * Truncation followed by a rewrite that makes the file longer than our offset before the next poll is
/// invisible on platforms without inodes.
/// * A same-size rewrite is only noticed if it changes the first `HEAD_LEN` bytes.
/// * Stopping is only noticed between polls, so `stop` may take up to one poll interval plus one read.
/// Number of leading bytes remembered to tell a rewritten file from a touched one
const HEAD_LEN: usize = 64;

pub struct Tailer<L> {
    config: TailerConfig,
    listener: L,
    handle: TailerHandle,
    watched: Option<WatchedFile>,
    lines: LineBuffer,
    buf: Vec<u8>,
    /// `on_file_not_found` was already reported for current absence
    missing_reported: bool,
    /// file was open before it went missing, so its return counts as rotation
    lost: bool,
}

/// Open handle of tailed file with what we learned about it so far
struct WatchedFile {
    file: File,
    identity: Option<FileIdentity>,
    /// bytes taken from file, including a not yet terminated line
    read_position: u64,
    last_size: u64,
    last_modified: Option<SystemTime>,
    /// up to `HEAD_LEN` first bytes of the file
    head: Vec<u8>,
}

impl WatchedFile {
    fn open(path: &Path, from_beginning: bool) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let metadata = file.metadata()?;
        let start = if from_beginning { 0 } else { metadata.len() };
        let head = read_head(&mut file)?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            file,
            identity: FileIdentity::from_metadata(&metadata),
            read_position: start,
            last_size: metadata.len(),
            last_modified: metadata.modified().ok(),
            head,
        })
    }

    /// Same size, newer mtime and other leading bytes than we remember
    fn is_rewritten(&mut self, metadata: &Metadata) -> io::Result<bool> {
        if metadata.len() != self.read_position {
            return Ok(false);
        }
        let newer = match (self.last_modified, metadata.modified().ok()) {
            (Some(last), Some(current)) => current > last,
            _ => false,
        };
        if !newer {
            return Ok(false);
        }
        let head = read_head(&mut self.file)?;
        self.file.seek(SeekFrom::Start(self.read_position))?;
        if head.starts_with(&self.head) {
            // touched, content is what we already read
            self.last_modified = metadata.modified().ok();
            self.head = head;
            return Ok(false);
        }
        Ok(true)
    }

    /// Remember size and mtime of what was read so far. Stat is taken after reading so that a later
    /// newer mtime with unchanged size can only mean modification without growth.
    fn record_state(&mut self) -> io::Result<()> {
        let metadata = self.file.metadata()?;
        self.last_size = metadata.len();
        self.last_modified = metadata.modified().ok();
        if self.head.len() < HEAD_LEN && self.read_position > self.head.len() as u64 {
            self.head = read_head(&mut self.file)?;
            self.file.seek(SeekFrom::Start(self.read_position))?;
        }
        Ok(())
    }

    fn is_replaced_by(&self, metadata: &Metadata) -> bool {
        identity_changed(self.identity, FileIdentity::from_metadata(metadata))
    }

    fn is_truncated(&self, metadata: &Metadata) -> bool {
        metadata.len() < self.read_position
    }

    /// Read until end of file, passing completed lines to `listener`
    fn read_available(
        &mut self,
        buf: &mut [u8],
        lines: &mut LineBuffer,
        listener: &mut impl TailerListener,
    ) -> io::Result<u64> {
        let mut total = 0;
        loop {
            let size_read = match self.file.read(buf) {
                Ok(0) => break,
                Ok(size_read) => size_read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.read_position += size_read as u64;
            total += size_read as u64;
            let emitted = lines.push(&buf[..size_read], |line| listener.on_new_line(line));
            trace!(
                bytes = size_read,
                lines = emitted,
                position = self.read_position,
                "read chunk"
            );
        }
        Ok(total)
    }
}

/// Read up to `HEAD_LEN` bytes from file start. Leaves cursor wherever reading stopped.
fn read_head(file: &mut File) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(0))?;
    let mut head = Vec::with_capacity(HEAD_LEN);
    file.by_ref().take(HEAD_LEN as u64).read_to_end(&mut head)?;
    Ok(head)
}

impl<L: TailerListener> Tailer<L> {
    /// Creates a tailer for `path` with default settings. The file does not need to exist yet.
    pub fn new(path: impl AsRef<Path>, listener: L) -> Result<Self, TailerError> {
        Self::with_config(TailerConfig::new(path), listener)
    }

    /// Creates a tailer, failing with `TailerError::Configuration` if config is invalid
    pub fn with_config(config: TailerConfig, listener: L) -> Result<Self, TailerError> {
        config.validate()?;
        let handle = TailerHandle::new(config.path.clone());
        let buf = vec![0; config.buffer_size];
        Ok(Self {
            config,
            listener,
            handle,
            watched: None,
            lines: LineBuffer::new(),
            buf,
            missing_reported: false,
            lost: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval_duration()
    }

    pub fn config(&self) -> &TailerConfig {
        &self.config
    }

    /// Handle that can be moved to another thread to stop this tailer
    pub fn handle(&self) -> TailerHandle {
        self.handle.clone()
    }

    /// Offset right after the last delivered line, zero while file is not open
    pub fn position(&self) -> u64 {
        self.watched
            .as_ref()
            .map(|watched| watched.read_position - self.lines.pending_len() as u64)
            .unwrap_or_default()
    }

    /// Request `run` to return at the next poll boundary. Idempotent and non-blocking.
    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Destroy tailer and return its listener
    pub fn into_listener(self) -> L {
        self.listener
    }

    /// Poll the file until stopped. Blocks the calling thread.
    ///
    /// Once stopped, a tailer stays stopped: calling `run` again returns right after `on_init`.
    pub fn run(&mut self) {
        let span = tracing::debug_span!("tailer", path = %self.config.path.display());
        let _entered = span.enter();

        self.listener.on_init(&self.handle);
        debug!(
            interval_ms = self.config.poll_interval_ms,
            from_start = self.config.from_start,
            "tailer started"
        );
        let interval = self.poll_interval();
        while !self.handle.is_stopped() {
            self.poll();
            if self.handle.is_stopped() {
                break;
            }
            thread::sleep(interval);
        }
        self.watched = None;
        debug!("tailer stopped");
    }

    /// Single poll cycle
    fn poll(&mut self) {
        let metadata = match fs::metadata(&self.config.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.mark_missing();
                return;
            }
            Err(e) => {
                self.report(TailerError::FileUnavailable {
                    path: self.config.path.clone(),
                    source: e,
                });
                return;
            }
        };

        match &self.watched {
            Some(watched) if watched.is_replaced_by(&metadata) => {
                debug!(
                    old = ?watched.identity,
                    new = ?FileIdentity::from_metadata(&metadata),
                    "file was replaced"
                );
                // whatever was appended to the old file before the switch still belongs to the stream
                self.read_new_content();
                self.rotate();
                if !self.open(true) {
                    return;
                }
            }
            Some(watched) if watched.is_truncated(&metadata) => {
                debug!(
                    position = watched.read_position,
                    last_size = watched.last_size,
                    size = metadata.len(),
                    last_modified = ?watched.last_modified,
                    "file was truncated"
                );
                self.rotate();
                if !self.open(true) {
                    return;
                }
            }
            Some(watched) if metadata.len() == watched.read_position => {
                if !self.check_rewritten(&metadata) {
                    return;
                }
                self.rotate();
                if !self.open(true) {
                    return;
                }
            }
            Some(_) => {}
            None => {
                // a file that came back after going missing is new, all of it is unread
                let from_beginning = self.lost || self.config.from_start;
                if !self.open(from_beginning) {
                    return;
                }
            }
        }

        self.read_new_content();
        if let Some(watched) = self.watched.as_mut() {
            if let Err(e) = watched.record_state() {
                self.report(TailerError::Io(e));
            }
        }
    }

    fn check_rewritten(&mut self, metadata: &Metadata) -> bool {
        let Some(watched) = self.watched.as_mut() else {
            return false;
        };
        match watched.is_rewritten(metadata) {
            Ok(true) => {
                debug!(
                    size = metadata.len(),
                    last_modified = ?watched.last_modified,
                    "file was rewritten in place"
                );
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.report(TailerError::Io(e));
                false
            }
        }
    }

    /// Open tailed file, returns false if it could not be opened
    fn open(&mut self, from_beginning: bool) -> bool {
        match WatchedFile::open(&self.config.path, from_beginning) {
            Ok(watched) => {
                debug!(
                    position = watched.read_position,
                    size = watched.last_size,
                    "opened file"
                );
                self.watched = Some(watched);
                self.missing_reported = false;
                if self.lost {
                    self.lost = false;
                    self.listener.on_file_rotated();
                }
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.mark_missing();
                false
            }
            Err(e) => {
                self.report(TailerError::FileUnavailable {
                    path: self.config.path.clone(),
                    source: e,
                });
                false
            }
        }
    }

    fn read_new_content(&mut self) {
        let Some(watched) = self.watched.as_mut() else {
            return;
        };
        if let Err(e) = watched.read_available(&mut self.buf, &mut self.lines, &mut self.listener) {
            if e.kind() == io::ErrorKind::NotFound {
                self.mark_missing();
            } else {
                self.report(TailerError::Io(e));
            }
        }
    }

    fn rotate(&mut self) {
        self.watched = None;
        self.lines.clear();
        self.listener.on_file_rotated();
    }

    fn mark_missing(&mut self) {
        if let Some(mut watched) = self.watched.take() {
            debug!("file disappeared");
            // renamed away, lines appended before that are still readable through our handle
            if let Err(e) = watched.read_available(&mut self.buf, &mut self.lines, &mut self.listener)
            {
                self.report(TailerError::Io(e));
            }
            self.lost = true;
        }
        self.lines.clear();
        if !self.missing_reported {
            self.missing_reported = true;
            self.listener.on_file_not_found();
        }
    }

    fn report(&mut self, error: TailerError) {
        // stop raced with the failing operation, nobody is interested anymore
        if self.handle.is_stopped() {
            return;
        }
        warn!(error = %error, "error while tailing");
        self.listener.on_error(error);
    }
}

impl<L: TailerListener + Send + 'static> Tailer<L> {
    /// Run a new tailer on a dedicated thread.
    ///
    /// Returned thread yields the listener back once the tailer is stopped through the handle.
    pub fn spawn(
        config: TailerConfig,
        listener: L,
    ) -> Result<(TailerHandle, JoinHandle<L>), TailerError> {
        let mut tailer = Self::with_config(config, listener)?;
        let handle = tailer.handle();
        let thread_name = match tailer.path().file_name() {
            Some(name) => format!("tail {}", name.to_string_lossy()),
            None => "tail".to_string(),
        };
        let thread = thread::Builder::new().name(thread_name).spawn(move || {
            tailer.run();
            tailer.into_listener()
        })?;
        Ok((handle, thread))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{self, OpenOptions},
        io::Write,
        path::{Path, PathBuf},
        time::{Duration, SystemTime},
    };

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::Tailer;
    use crate::{TailerConfig, TailerError, TailerHandle, TailerListener};

    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
        init: usize,
        not_found: usize,
        rotated: usize,
        errors: Vec<TailerError>,
    }

    impl TailerListener for Recorder {
        fn on_init(&mut self, _handle: &TailerHandle) {
            self.init += 1;
        }

        fn on_file_not_found(&mut self) {
            self.not_found += 1;
        }

        fn on_file_rotated(&mut self) {
            self.rotated += 1;
        }

        fn on_new_line(&mut self, line: String) {
            self.lines.push(line);
        }

        fn on_error(&mut self, error: TailerError) {
            self.errors.push(error);
        }
    }

    impl Recorder {
        fn take_lines(&mut self) -> Vec<String> {
            std::mem::take(&mut self.lines)
        }
    }

    struct Fixture {
        _dir: TempDir,
        path: PathBuf,
    }

    #[fixture]
    fn workspace() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tailed.log");
        Fixture { _dir: dir, path }
    }

    fn append(path: &Path, content: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn bump_modified(path: &Path) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();
    }

    fn tailer(path: &Path, from_start: bool) -> Tailer<Recorder> {
        let config = TailerConfig::new(path)
            .poll_interval(Duration::from_millis(10))
            .from_start(from_start)
            .buffer_size(8);
        Tailer::with_config(config, Recorder::default()).unwrap()
    }

    #[test]
    fn poll_interval_must_be_positive() {
        let config = TailerConfig::new("a.log").poll_interval(Duration::ZERO);
        assert!(matches!(
            Tailer::with_config(config, Recorder::default()),
            Err(TailerError::Configuration(_))
        ));
    }

    #[test]
    fn huge_buffer_is_rejected_before_allocation() {
        let config = TailerConfig::new("a.log").buffer_size(usize::MAX);
        assert!(matches!(
            Tailer::with_config(config, Recorder::default()),
            Err(TailerError::Configuration(_))
        ));
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(matches!(
            Tailer::new("", Recorder::default()),
            Err(TailerError::Configuration(_))
        ));
    }

    #[rstest]
    #[case(true, vec!["existing", "appended"])]
    #[case(false, vec!["appended"])]
    fn existing_content_depends_on_from_start(
        workspace: Fixture,
        #[case] from_start: bool,
        #[case] expected: Vec<&str>,
    ) {
        append(&workspace.path, "existing\n");
        let mut tailer = tailer(&workspace.path, from_start);
        tailer.poll();
        append(&workspace.path, "appended\n");
        tailer.poll();

        assert_eq!(tailer.listener.lines, expected);
    }

    #[rstest]
    fn lines_longer_than_buffer_are_assembled(workspace: Fixture) {
        append(&workspace.path, "");
        let mut tailer = tailer(&workspace.path, false);
        tailer.poll();
        append(&workspace.path, "a line much longer than eight bytes\nshort\n");
        tailer.poll();

        assert_eq!(
            tailer.listener.lines,
            vec!["a line much longer than eight bytes", "short"]
        );
        assert_eq!(tailer.position(), 42);
    }

    #[rstest]
    fn partial_line_waits_for_terminator(workspace: Fixture) {
        append(&workspace.path, "");
        let mut tailer = tailer(&workspace.path, false);
        tailer.poll();

        append(&workspace.path, "Line");
        tailer.poll();
        assert!(tailer.listener.lines.is_empty());
        assert_eq!(tailer.position(), 0);

        append(&workspace.path, " one\n");
        tailer.poll();
        assert_eq!(tailer.listener.take_lines(), vec!["Line one"]);
        assert_eq!(tailer.position(), 9);
    }

    #[rstest]
    fn missing_file_is_reported_once(workspace: Fixture) {
        let mut tailer = tailer(&workspace.path, true);
        for _ in 0..3 {
            tailer.poll();
        }
        assert_eq!(tailer.listener.not_found, 1);
        assert!(tailer.listener.lines.is_empty());
        assert!(tailer.listener.errors.is_empty());

        append(&workspace.path, "late\n");
        tailer.poll();
        assert_eq!(tailer.listener.lines, vec!["late"]);
        assert_eq!(tailer.listener.rotated, 0);
    }

    #[rstest]
    fn truncation_restarts_from_zero(workspace: Fixture) {
        append(&workspace.path, "first\nsecond\n");
        let mut tailer = tailer(&workspace.path, true);
        tailer.poll();
        assert_eq!(tailer.listener.take_lines(), vec!["first", "second"]);

        fs::write(&workspace.path, "new\n").unwrap();
        tailer.poll();

        assert_eq!(tailer.listener.rotated, 1);
        assert_eq!(tailer.listener.take_lines(), vec!["new"]);
        assert_eq!(tailer.position(), 4);
    }

    #[rstest]
    fn deleted_and_recreated_file_counts_as_one_rotation(workspace: Fixture) {
        append(&workspace.path, "before\n");
        let mut tailer = tailer(&workspace.path, true);
        tailer.poll();

        fs::remove_file(&workspace.path).unwrap();
        tailer.poll();
        tailer.poll();
        assert_eq!(tailer.listener.not_found, 1);
        assert_eq!(tailer.position(), 0);

        append(&workspace.path, "after\n");
        tailer.poll();

        assert_eq!(tailer.listener.rotated, 1);
        assert_eq!(tailer.listener.lines, vec!["before", "after"]);
    }

    #[cfg(unix)]
    #[rstest]
    fn renamed_file_is_drained_before_switching(workspace: Fixture) {
        append(&workspace.path, "one\n");
        let mut tailer = tailer(&workspace.path, false);
        tailer.poll();
        append(&workspace.path, "two\n");

        let rotated_path = workspace.path.with_extension("log.1");
        fs::rename(&workspace.path, &rotated_path).unwrap();
        append(&rotated_path, "three\n");
        append(&workspace.path, "four\n");
        tailer.poll();

        assert_eq!(tailer.listener.lines, vec!["two", "three", "four"]);
        assert_eq!(tailer.listener.rotated, 1);
        assert_eq!(tailer.listener.not_found, 0);
    }

    #[rstest]
    fn file_recreated_after_gap_is_read_from_start(workspace: Fixture) {
        append(&workspace.path, "before\n");
        let mut tailer = tailer(&workspace.path, false);
        tailer.poll();

        fs::remove_file(&workspace.path).unwrap();
        tailer.poll();
        append(&workspace.path, "after recreate\n");
        tailer.poll();

        assert_eq!(tailer.listener.lines, vec!["after recreate"]);
        assert_eq!(tailer.listener.not_found, 1);
        assert_eq!(tailer.listener.rotated, 1);
    }

    #[cfg(unix)]
    #[rstest]
    fn file_renamed_away_is_drained_while_path_is_missing(workspace: Fixture) {
        append(&workspace.path, "one\n");
        let mut tailer = tailer(&workspace.path, true);
        tailer.poll();

        append(&workspace.path, "two\n");
        fs::rename(&workspace.path, workspace.path.with_extension("log.1")).unwrap();
        tailer.poll();
        assert_eq!(tailer.listener.not_found, 1);

        append(&workspace.path, "three\n");
        tailer.poll();

        assert_eq!(tailer.listener.lines, vec!["one", "two", "three"]);
        assert_eq!(tailer.listener.rotated, 1);
    }

    #[rstest]
    fn same_size_rewrite_restarts_from_zero(workspace: Fixture) {
        append(&workspace.path, "aaa\n");
        let mut tailer = tailer(&workspace.path, true);
        tailer.poll();

        fs::write(&workspace.path, "bbb\n").unwrap();
        bump_modified(&workspace.path);
        tailer.poll();

        assert_eq!(tailer.listener.lines, vec!["aaa", "bbb"]);
        assert_eq!(tailer.listener.rotated, 1);
        assert_eq!(tailer.position(), 4);
    }

    #[rstest]
    fn touched_file_is_not_reread(workspace: Fixture) {
        append(&workspace.path, "aaa\n");
        let mut tailer = tailer(&workspace.path, true);
        tailer.poll();

        bump_modified(&workspace.path);
        tailer.poll();
        tailer.poll();

        assert_eq!(tailer.listener.lines, vec!["aaa"]);
        assert_eq!(tailer.listener.rotated, 0);
        assert!(tailer.listener.errors.is_empty());
    }

    #[rstest]
    fn stopped_tailer_does_not_poll(workspace: Fixture) {
        append(&workspace.path, "ignored\n");
        let mut tailer = tailer(&workspace.path, true);
        tailer.stop();
        tailer.run();

        assert_eq!(tailer.listener.init, 1);
        assert!(tailer.listener.lines.is_empty());
        assert_eq!(tailer.position(), 0);
    }
}
