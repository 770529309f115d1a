pub mod linkgraph;
pub mod parsing;
pub mod ports;
pub mod services;
