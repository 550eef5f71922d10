//! Endpoint resolution
//!
//! Picks the endpoints used by the engine out of the first configuration
//! descriptor. Pure functions of descriptor data; claiming is left to the
//! session.

use common::{ConfigurationInfo, Direction, EndpointInfo};

/// Interface number carrying the vendor report stream
pub const REPORT_INTERFACE_NUMBER: u8 = 3;

/// Bulk IN/OUT pair used for command/response exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEndpoints {
    pub interface: u8,
    pub input: EndpointInfo,
    pub output: EndpointInfo,
}

/// Interrupt IN endpoint carrying the report stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportEndpoint {
    pub interface: u8,
    pub input: EndpointInfo,
}

/// Find the command interface
///
/// Accepts the first interface exposing at least two endpoints among which
/// exactly one is IN and exactly one is OUT.
pub fn resolve_command_endpoints(config: &ConfigurationInfo) -> Option<CommandEndpoints> {
    config
        .interfaces
        .iter()
        .filter(|interface| interface.endpoints.len() >= 2)
        .find_map(|interface| {
            let mut inputs = interface
                .endpoints
                .iter()
                .filter(|ep| ep.direction == Direction::In);
            let mut outputs = interface
                .endpoints
                .iter()
                .filter(|ep| ep.direction == Direction::Out);

            match (inputs.next(), inputs.next(), outputs.next(), outputs.next()) {
                (Some(input), None, Some(output), None) => Some(CommandEndpoints {
                    interface: interface.number,
                    input: *input,
                    output: *output,
                }),
                _ => None,
            }
        })
}

/// Find the report interface: number 3 with exactly one endpoint
pub fn resolve_report_endpoint(config: &ConfigurationInfo) -> Option<ReportEndpoint> {
    config
        .interfaces
        .iter()
        .find(|interface| {
            interface.number == REPORT_INTERFACE_NUMBER && interface.endpoints.len() == 1
        })
        .map(|interface| ReportEndpoint {
            interface: interface.number,
            input: interface.endpoints[0],
        })
}
