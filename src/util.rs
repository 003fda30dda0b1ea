use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const API_PORT: &str = "PINGWATCH_PORT";

const DEFAULT_PORT: u16 = 8080;

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(API_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

pub fn get_default_bind_addr() -> SocketAddr {
    SocketAddr::new(DEFAULT_ADDR, get_port())
}

const SMTP_PASSWORD: &str = "SMTP_PASSWORD";

pub fn get_smtp_password() -> Option<String> {
    let secret_from_env = std::env::var(SMTP_PASSWORD);
    secret_from_env.ok()
}
