// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Personal task-runner.
//!
//! Chored resolves named __chores__ from task files in a project's task root
//! (falling back to a builtin module bundled with the tool), and invokes them
//! with typed options parsed from the command line. The library also carries
//! the machinery that the builtin chores are made of: version tag inference
//! from Git history, generated file rendering, remote import URL bumping, and
//! self-updating pull requests.

pub mod bump;
pub mod chore;
pub mod cmd;
pub mod config;
pub mod deps;
pub mod git;
pub mod github;
pub mod path;
pub mod render;
pub mod self_update;
pub mod version;
