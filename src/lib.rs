// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Task runner for WordPress sites hosted on Pantheon.
//!
//! wptask provisions, configures, deploys, and tests a WordPress site built on
//! the Bedrock project layout. Almost all of the work is done by external
//! tools: Composer, WP-CLI, Git, rsync, Terminus, Behat, and PHP. wptask
//! figures out _what_ to call them with, and in which order.
//!
//! # Deployment
//!
//! Pantheon hosts sites from its own Git repository, called the __host
//! repository__ here. The site's own repository is never pushed there
//! directly. Instead, the site's files are mirrored into a fresh checkout of
//! the host repository, and the difference is committed as one combined commit
//! listing every site commit since the last deployment. See [`deploy`] for the
//! full pipeline.
//!
//! # Configuration
//!
//! Per-machine project configuration lives in the `.env` file of the project,
//! see [`project`] for how it is resolved. Tool settings live in
//! `wptask.toml`, see [`config`].

pub mod config;
pub mod deploy;
pub mod envfile;
pub mod git;
pub mod hosting;
pub mod path;
pub mod project;
pub mod site;
pub mod syscall;
pub mod template;
