//! Test doubles: an in-memory model of the `tc` tool and a fixed interface lister.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};

use crate::{
    command::{Error, Executor, Invocation, Output, Result},
    iface::InterfaceLister,
};

/// Netem parameters installed on a fake interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Netem {
    handle: u32,
    loss: Option<u32>,
    delay: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    /// Interfaces in creation order, with their root netem qdisc if any.
    devices: Vec<(String, Option<Netem>)>,
    next_handle: u32,
    invocations: Vec<Invocation>,
}

impl State {
    fn device(&mut self, name: &str) -> Option<&mut Option<Netem>> {
        self.devices.iter_mut().find(|(n, _)| n == name).map(|(_, q)| q)
    }
}

/// An [`Executor`] behaving like `tc` on a host with a fixed set of interfaces.
///
/// Understands `tc qdisc show [dev <name>]`, `tc -force -batch -` with `qdisc del|add` lines,
/// optionally prefixed by `sudo`. Any program whose name ends in `listInterfaces` prints the
/// interface names.
#[derive(Debug, Default)]
pub struct FakeTc {
    state: Mutex<State>,
    fail_listing: AtomicBool,
    time_out_batches: AtomicBool,
    deny_batches: AtomicBool,
}

impl FakeTc {
    /// Creates a host with `names` as interfaces, none of them impaired.
    pub fn with_interfaces<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices = names.into_iter().map(|n| (n.into(), None)).collect();
        Self {
            state: Mutex::new(State { devices, next_handle: 0x8001, invocations: Vec::new() }),
            ..Default::default()
        }
    }

    /// Names of all interfaces, in creation order.
    pub fn interfaces(&self) -> Vec<String> {
        self.lock().devices.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Every `tc` invocation received so far, `sudo` included.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().invocations.clone()
    }

    /// Makes the lister program exit with a failure.
    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::Relaxed);
    }

    /// When set, batches are applied but reported as timed out.
    pub fn time_out_batches(&self, enabled: bool) {
        self.time_out_batches.store(enabled, Ordering::Relaxed);
    }

    /// When set, batches fail as a whole before touching any interface, the way `tc` does
    /// without `CAP_NET_ADMIN`. The report names no failed line.
    pub fn deny_batches(&self, enabled: bool) {
        self.deny_batches.store(enabled, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    fn list(&self) -> Result<Output> {
        if self.fail_listing.load(Ordering::Relaxed) {
            return Err(Error::NonZero(Output { code: Some(1), ..Default::default() }));
        }

        Ok(Output::success(self.interfaces().join(" ") + "\n"))
    }

    /// Runs `invocation` with `sudo` already stripped, recording `received` as-is.
    fn tc(&self, received: &Invocation, invocation: &Invocation, timeout: Duration) -> Result<Output> {
        let args: Vec<&str> = invocation.args.iter().map(String::as_str).collect();
        let mut state = self.lock();
        state.invocations.push(received.clone());

        match args.as_slice() {
            ["qdisc", "show"] => {
                Ok(Output::success(state.devices.iter().map(|(n, q)| record(n, q)).collect::<String>()))
            }
            ["qdisc", "show", "dev", name] => match state.device(name) {
                Some(q) => Ok(Output::success(record(name, q))),
                None => Err(failure(format!("Cannot find device \"{name}\"\n"))),
            },
            ["-force", "-batch", "-"] if self.deny_batches.load(Ordering::Relaxed) => {
                Err(failure("RTNETLINK answers: Operation not permitted\n".to_string()))
            }
            ["-force", "-batch", "-"] => {
                let script = invocation.stdin.as_deref().unwrap_or_default();
                let mut stderr = String::new();
                for (i, line) in script.lines().enumerate() {
                    if let Err(e) = apply_line(&mut state, line) {
                        stderr.push_str(&format!("{e}\nCommand failed -:{}\n", i + 1));
                    }
                }

                let output = Output { code: Some(if stderr.is_empty() { 0 } else { 1 }), stdout: String::new(), stderr };
                if self.time_out_batches.load(Ordering::Relaxed) {
                    return Err(Error::TimedOut(timeout, Output { code: None, ..output }));
                }
                if !output.is_success() {
                    return Err(Error::NonZero(output));
                }
                Ok(output)
            }
            _ => Err(failure(format!("Command \"{}\" is unknown, try \"tc help\".\n", args.join(" ")))),
        }
    }
}

#[async_trait]
impl Executor for FakeTc {
    async fn run(&self, received: &Invocation, timeout: Duration) -> Result<Output> {
        let invocation = match (received.program.as_str(), received.args.split_first()) {
            ("sudo", Some((program, args))) => Invocation {
                program: program.clone(),
                args: args.to_vec(),
                stdin: received.stdin.clone(),
            },
            ("sudo", None) => return Err(failure("usage: sudo -h | -K | -k | -V\n".to_string())),
            _ => received.clone(),
        };

        if invocation.program.ends_with("listInterfaces") {
            return self.list();
        }
        if invocation.program.ends_with("tc") {
            return self.tc(received, &invocation, timeout);
        }

        Err(Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, invocation.program)))
    }
}

fn failure(stderr: String) -> Error {
    Error::NonZero(Output { code: Some(1), stdout: String::new(), stderr })
}

/// Applies one batch line, returning the error `tc` would print.
fn apply_line(state: &mut State, line: &str) -> std::result::Result<(), String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let handle = state.next_handle;

    match tokens.as_slice() {
        ["qdisc", "del", "dev", name, "root"] => {
            let q = state.device(name).ok_or_else(|| format!("Cannot find device \"{name}\""))?;
            q.take().map(|_| ()).ok_or_else(|| "Error: Cannot delete qdisc with handle of zero.".to_string())
        }
        ["qdisc", "add", "dev", name, "root", "netem", params @ ..] => {
            let netem = parse_netem(handle, params)?;
            let q = state.device(name).ok_or_else(|| format!("Cannot find device \"{name}\""))?;
            if q.is_some() {
                return Err("Error: Exclusivity flag on, cannot modify.".to_string());
            }
            *q = Some(netem);
            state.next_handle += 1;
            Ok(())
        }
        _ => Err(format!("Unknown qdisc command {line:?}")),
    }
}

fn parse_netem(handle: u32, params: &[&str]) -> std::result::Result<Netem, String> {
    let mut netem = Netem { handle, loss: None, delay: None };
    let mut iter = params.iter();

    while let Some(key) = iter.next() {
        let value = iter.next().ok_or_else(|| format!("Illegal \"{key}\""))?;
        match *key {
            "loss" => {
                let v = value.strip_suffix('%').and_then(|v| v.parse().ok());
                netem.loss = Some(v.ok_or_else(|| format!("Illegal \"loss\" {value}"))?);
            }
            "delay" => {
                let v = value.strip_suffix("ms").and_then(|v| v.parse().ok());
                netem.delay = Some(v.ok_or_else(|| format!("Illegal \"latency\" {value}"))?);
            }
            _ => return Err(format!("What is \"{key}\"?")),
        }
    }

    Ok(netem)
}

/// Renders a `tc qdisc show` line the way iproute2 does.
fn record(name: &str, qdisc: &Option<Netem>) -> String {
    match qdisc {
        None => format!("qdisc noqueue 0: dev {name} root refcnt 2\n"),
        Some(netem) => {
            let mut line = format!("qdisc netem {:x}: dev {name} root refcnt 2 limit 1000", netem.handle);
            if let Some(delay) = netem.delay {
                line.push_str(&format!(" delay {}", format_delay(delay)));
            }
            if let Some(loss) = netem.loss {
                line.push_str(&format!(" loss {loss}%"));
            }
            line.push('\n');
            line
        }
    }
}

/// Formats a delay like iproute2's `print_time`: `%.3gs` from one second on, `%.3gms` below.
///
/// Three significant digits mean delays of a second or more lose precision, 1234ms prints as
/// `1.23s`.
fn format_delay(ms: u32) -> String {
    if ms < 1_000 {
        // At most three digits, `%.3g` prints them exactly.
        return format!("{ms}ms");
    }

    let secs = f64::from(ms) / 1_000.0;
    // `%.3g` for values in [1, 10) keeps two decimals and drops trailing zeros.
    let secs = if secs < 10.0 { format!("{secs:.2}") } else { format!("{secs:.1}") };
    format!("{}s", secs.trim_end_matches('0').trim_end_matches('.'))
}

/// An [`InterfaceLister`] returning a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticLister {
    names: Vec<String>,
}

impl StaticLister {
    /// Creates a lister always returning `names`.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }
}

#[async_trait]
impl InterfaceLister for StaticLister {
    async fn list(&self) -> Vec<String> {
        self.names.clone()
    }
}
