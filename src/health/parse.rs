//! Parsers for the diagnostic command output.

/// Extracts the capacity percentage from POSIX `df -P` output.
///
/// The last non-empty line is the filesystem row; its fifth column is the
/// capacity, such as `58%`.
#[must_use]
pub fn parse_df_capacity(stdout: &str) -> Option<u8> {
    let row = stdout.lines().rev().find(|line| !line.trim().is_empty())?;
    let capacity = row.split_whitespace().nth(4)?;
    capacity.strip_suffix('%')?.parse().ok()
}

/// Returns the highest whole-percent CPU usage listed by `ps -o %cpu=`, or
/// `None` when no process matched.
#[must_use]
pub fn parse_ps_cpu(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let whole = line.split_once('.').map_or(line, |(integer, _)| integer);
            whole.parse::<u32>().ok()
        })
        .max()
}
