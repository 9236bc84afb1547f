#![cfg(test)]

mod containers;
mod lifecycle;
mod services;
