// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage: demo_mesh_chat <node-name>   (run multiple instances, any node names)
//
// Each instance joins the mesh under its own node name, discovers peers via
// the registry's broadcast REGISTER/HEARTBEAT traffic, and lets you send a
// line of text to a peer by name. Type "q" to quit.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use cortez_mesh_ipc::mesh::MeshOptions;
use cortez_mesh_ipc::{Mesh, MSG_USER_START};

const QUIT: &str = "q";

fn main() {
    let node_name = std::env::args().nth(1).unwrap_or_else(|| "anon".to_string());

    let mesh = Arc::new(Mesh::init(&node_name, &MeshOptions::default()).expect("mesh init"));
    println!("{node_name} joined the mesh as pid {}", mesh.pid());

    let recv_mesh = Arc::clone(&mesh);
    let recv_thread = thread::spawn(move || loop {
        match recv_mesh.read(None) {
            Ok(msg) if msg.msg_type() >= MSG_USER_START => {
                let text = String::from_utf8_lossy(msg.payload()).into_owned();
                println!("[{}] {text}", msg.sender_pid());
                if text.trim() == QUIT {
                    break;
                }
            }
            Ok(_) => continue,
            Err(_) => break,
        }
    });

    let stdin = io::stdin();
    loop {
        print!("peer> ");
        io::stdout().flush().ok();
        let mut peer_line = String::new();
        if stdin.lock().read_line(&mut peer_line).is_err() || peer_line.trim().is_empty() {
            continue;
        }
        let peer_name = peer_line.trim().to_string();
        if peer_name == QUIT {
            break;
        }

        let peer = match mesh.find_peer_by_name(&peer_name) {
            Some(p) => p,
            None => {
                println!("no peer matching '{peer_name}' yet");
                continue;
            }
        };

        print!("msg> ");
        io::stdout().flush().ok();
        let mut msg_line = String::new();
        if stdin.lock().read_line(&mut msg_line).is_err() {
            break;
        }
        mesh.send(peer.pid, MSG_USER_START, msg_line.trim().as_bytes())
            .expect("send");
    }

    mesh.shutdown();
    recv_thread.join().ok();
}
