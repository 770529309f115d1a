// Module layout (Clean Architecture style)
// - bootstrap: configuration and startup wiring
// - infrastructure: link stores (postgres, in-memory) and event buses
// - presentation: HTTP handlers and routing
// - application: link parsing, ports and the link manager service
// - domain: link, occurrence and graph models

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
