// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Command names and well-known keys of the frame protocol.

/// Key naming the command a request frame carries.
pub const COMMAND_KEY: &str = "vinci:COMMAND";
/// Status key set by services answering `GetPid`.
pub const STATUS_KEY: &str = "vinci:STATUS";
/// Key a service uses to report an embedded failure.
pub const ERROR_KEY: &str = "vinci:ERROR";
/// Older services report failures under this key instead.
pub const LEGACY_ERROR_KEY: &str = "Error";

pub const STATUS_OK: &str = "OK";

/// Health check. The reply carries capability metadata.
pub const GET_META: &str = "GetMeta";
pub const GET_PID: &str = "GetPid";
pub const ANNOTATE: &str = "Annotate";
pub const BATCH_PROCESS_COMPLETE: &str = "BatchProcessComplete";
pub const COLLECTION_PROCESS_COMPLETE: &str = "CollectionProcessComplete";
pub const SHUTDOWN: &str = "Shutdown";

/// Directory lookup of a service name.
pub const RESOLVE: &str = "resolve";

/// Reply text of services that predate `GetMeta`. The service is alive but has no metadata.
pub const NO_SUCH_COMMAND: &str = "No Such Command supported";

pub const PID_KEY: &str = "PID";
pub const DATA_KEY: &str = "DATA";
pub const KEYS_KEY: &str = "KEYS";
pub const UEID_KEY: &str = "UEID";
pub const DOCUMENT_TEXT_KEY: &str = "DocumentText";
pub const ANNOTATION_TIME_KEY: &str = "AnnotationTime";
pub const METADATA_KEY: &str = "METADATA";

pub const SERVICE_KEY: &str = "SERVICE";
pub const SERVER_KEY: &str = "SERVER";
pub const HOST_KEY: &str = "HOST";
pub const PORT_KEY: &str = "PORT";
