// UI module - Front-end rendering of build progress
//
// This module contains:
// - ConsoleReporter: Renders BuildEvents (phase, percent, live output, final report) to a terminal

pub mod console;

pub use console::ConsoleReporter;
