use crate::{AttributeValue, Attributes, Procfs, machine_id};

/// Reads operating system, runtime and host descriptors.
///
/// Values that need procfs are skipped when it is unavailable; the portable
/// ones (`uname.sysname`, `uname.machine`, `cpu.count`, `process.id`,
/// `guid`) are always present.
pub(crate) fn read_system_attributes(procfs: &Procfs) -> Attributes {
    let mut attributes = Attributes::new();

    attributes.insert("process.id".to_owned(), std::process::id().into());
    attributes.insert(
        "process.thread.count".to_owned(),
        thread_count(procfs).unwrap_or(1).into(),
    );
    attributes.insert("uname.sysname".to_owned(), std::env::consts::OS.into());
    attributes.insert("uname.machine".to_owned(), std::env::consts::ARCH.into());
    if let Some(release) = procfs.read("sys/kernel/osrelease") {
        attributes.insert("uname.version".to_owned(), release.trim().into());
    }
    if let Some(uptime) = procfs.read("uptime").and_then(|content| parse_uptime(&content)) {
        attributes.insert("uname.uptime".to_owned(), uptime.into());
    }
    if let Ok(count) = std::thread::available_parallelism() {
        attributes.insert("cpu.count".to_owned(), count.get().into());
    }
    if let Some(brand) = procfs.read("cpuinfo").and_then(|content| parse_cpu_brand(&content)) {
        attributes.insert("cpu.brand".to_owned(), AttributeValue::String(brand));
    }
    if let Some(hostname) = hostname(procfs) {
        attributes.insert("hostname".to_owned(), AttributeValue::String(hostname));
    }
    attributes.insert("guid".to_owned(), machine_id().into());

    attributes
}

fn thread_count(procfs: &Procfs) -> Option<usize> {
    let entries = std::fs::read_dir(procfs.root().join("self/task")).ok()?;
    let count = entries.filter_map(Result::ok).count();
    (count > 0).then_some(count)
}

/// Whole seconds since boot, from the first field of `/proc/uptime`.
fn parse_uptime(content: &str) -> Option<u64> {
    let seconds = content.split_whitespace().next()?.parse::<f64>().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| seconds as u64)
}

fn parse_cpu_brand(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "model name").then(|| value.trim().to_owned())
    })
}

pub(crate) fn hostname(procfs: &Procfs) -> Option<String> {
    procfs
        .read("sys/kernel/hostname")
        .map(|name| name.trim().to_owned())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .filter(|name| !name.is_empty())
}
