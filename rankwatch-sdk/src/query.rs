//! Pluggable device memory queries.
//!
//! [`ResourceQuery`] is the seam between the resource monitor and whatever
//! reports device memory. [`NvidiaSmi`] shells out to the vendor inventory
//! command; tests substitute closures.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::QueryError;

/// A raw memory reading for one device, in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceReading {
    pub used_mb: u64,
    pub total_mb: u64,
}

/// Source of device memory readings.
pub trait ResourceQuery: Send + Sync {
    fn query(&self) -> Result<DeviceReading, QueryError>;
}

impl<F> ResourceQuery for F
where
    F: Fn() -> Result<DeviceReading, QueryError> + Send + Sync,
{
    fn query(&self) -> Result<DeviceReading, QueryError> {
        self()
    }
}

/// Query that always fails, used when no device query is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevice;

impl ResourceQuery for NoDevice {
    fn query(&self) -> Result<DeviceReading, QueryError> {
        Err(QueryError::Unavailable("no device query configured".to_string()))
    }
}

/// Reads memory usage from `nvidia-smi`.
///
/// Runs `nvidia-smi --query-gpu=memory.used,memory.total --format=csv,nounits`
/// and reads `used, total` from a fixed output line (line 1, right below the
/// CSV header, by default). The command is killed if it outlives the timeout.
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    program: String,
    args: Vec<String>,
    line: usize,
    timeout: Duration,
    poll_interval: Duration,
}

impl NvidiaSmi {
    /// Create a query with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the query.
    pub fn builder() -> NvidiaSmiBuilder {
        NvidiaSmiBuilder::default()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn run(&self) -> Result<String, QueryError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| QueryError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // stdout must drain while the child runs or a full pipe blocks it
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut output = String::new();
                stdout.read_to_string(&mut output).map(|_| output)
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(QueryError::Timeout(self.timeout));
            }
            thread::sleep(self.poll_interval);
        };

        if !status.success() {
            return Err(QueryError::ExitStatus(status));
        }

        match reader {
            Some(reader) => reader
                .join()
                .map_err(|_| QueryError::Unavailable("stdout reader panicked".to_string()))?
                .map_err(QueryError::from),
            None => Ok(String::new()),
        }
    }
}

impl Default for NvidiaSmi {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceQuery for NvidiaSmi {
    fn query(&self) -> Result<DeviceReading, QueryError> {
        let output = self.run()?;
        parse_reading(&output, self.line)
    }
}

/// Builder for [`NvidiaSmi`].
#[derive(Debug)]
pub struct NvidiaSmiBuilder {
    program: String,
    args: Vec<String>,
    line: usize,
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for NvidiaSmiBuilder {
    fn default() -> Self {
        Self {
            program: "nvidia-smi".to_string(),
            args: vec![
                "--query-gpu=memory.used,memory.total".to_string(),
                "--format=csv,nounits".to_string(),
            ],
            line: 1,
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl NvidiaSmiBuilder {
    /// Override the executable (e.g. an absolute path).
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Replace the command-line arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Output line holding `used, total`. Line 1 is the first device.
    pub fn line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    /// Maximum time the command may run. Defaults to 5 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> NvidiaSmi {
        NvidiaSmi {
            program: self.program,
            args: self.args,
            line: self.line,
            timeout: self.timeout,
            poll_interval: self.poll_interval,
        }
    }
}

/// Parse `used, total` from the given line of CSV output.
pub fn parse_reading(output: &str, line: usize) -> Result<DeviceReading, QueryError> {
    let row = output
        .trim()
        .lines()
        .nth(line)
        .ok_or_else(|| QueryError::Parse(format!("missing output line {}", line)))?;

    let mut fields = row.split(',').map(str::trim);
    let (Some(used), Some(total), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(QueryError::Parse(format!("expected two fields, got {:?}", row)));
    };

    let parse = |field: &str| {
        field
            .parse::<u64>()
            .map_err(|e| QueryError::Parse(format!("{:?}: {}", field, e)))
    };

    Ok(DeviceReading {
        used_mb: parse(used)?,
        total_mb: parse(total)?,
    })
}
