// src/core/job/printer.rs

//! Terminal rendering of job progress.
//!
//! Progress is printed as one status glyph per host, grouped by cluster and
//! datacenter. Consecutive progress frames overwrite each other using ANSI
//! cursor movement, so a long job shows a live-updating picture instead of
//! scrolling; any interleaved message breaks the chain and the next frame
//! prints below it.

use crate::core::progress::Progress;
use crate::core::topology::{Host, Topology};

const CURSOR_UP: &str = "\x1b[1A";
const CLEAR_LINE: &str = "\x1b[2K";
const SET_BOLD: &str = "\x1b[1m";
const SET_NORMAL: &str = "\x1b[0m";

const LEGEND: &str = " +  Done, up      * Executing, up      !  Failed, up      . Waiting, up\n \
                      -  Done, down    / Executing, down    X  Failed, down    : Waiting, down";

/// Wraps a string in bold escape codes when ANSI output is enabled.
pub fn emph(text: &str, ansi: bool) -> String {
    if ansi {
        format!("{SET_BOLD}{text}{SET_NORMAL}")
    } else {
        text.to_string()
    }
}

/// Stateful writer that can redraw the previous progress frame in place.
pub struct TerminalWriter {
    ansi: bool,
    last_frame_lines: Option<usize>,
}

impl TerminalWriter {
    pub fn new(ansi: bool) -> Self {
        Self {
            ansi,
            last_frame_lines: None,
        }
    }

    pub fn ansi(&self) -> bool {
        self.ansi
    }

    /// Prints a plain message, breaking any in-place redraw chain.
    pub fn msg(&mut self, text: &str) {
        self.last_frame_lines = None;
        println!("{text}");
    }

    /// Prints a progress frame, overwriting the previous one when possible.
    pub fn frame(&mut self, frame: &str) {
        if self.ansi {
            if let Some(lines) = self.last_frame_lines {
                print!("{}", format!("{CLEAR_LINE}{CURSOR_UP}").repeat(lines));
                print!("{CLEAR_LINE}");
            }
        }
        println!("{frame}");
        self.last_frame_lines = Some(frame.lines().count());
    }
}

fn glyph(host: &Host, progress: &Progress, down: &Topology) -> char {
    let is_down = down.contains(host);
    if progress.done.contains(host) {
        if is_down { '-' } else { '+' }
    } else if progress.running.contains(host) {
        if is_down { '/' } else { '*' }
    } else if progress.failed.contains(host) {
        if is_down { 'X' } else { '!' }
    } else if is_down {
        ':'
    } else {
        '.'
    }
}

fn status_order(host: &Host, progress: &Progress) -> u32 {
    if progress.done.contains(host) {
        10
    } else if progress.failed.contains(host) {
        50
    } else if progress.running.contains(host) {
        100
    } else {
        1000
    }
}

/// Renders the full progress frame for a topology.
pub fn render_progress(original_topology: &Topology, progress: &Progress, down: &Topology) -> String {
    let mut lines = vec![LEGEND.to_string()];

    for cluster in original_topology.get_clusters() {
        lines.push(format!("Cluster: {cluster}"));
        let cluster_topology = original_topology.with_cluster(&cluster);
        for datacenter in cluster_topology.get_dcs() {
            lines.push(format!("DC: {}", datacenter.dc));
            let dc_topology = cluster_topology.with_dc(&datacenter.cluster, &datacenter.dc);
            let mut hosts: Vec<Host> = dc_topology.iter().cloned().collect();
            hosts.sort_by_key(|h| (status_order(h, progress), h.rack.clone(), h.ip.clone()));
            let glyphs: String = hosts.iter().map(|h| glyph(h, progress, down)).collect();
            lines.push(glyphs);
        }
    }
    lines.push(format!(
        "{} done, {} failed, {} executing",
        progress.done.len(),
        progress.failed.len(),
        progress.running.len()
    ));
    lines.join("\n")
}
