//! Mock links and transports.
