use std::io::Cursor;
use std::str;

use rsftp::{ConnectionOptions, FtpClient};

fn main() {
    let mut client = FtpClient::new(ConnectionOptions {
        server_host: "127.0.0.1".to_string(),
        username: "username".to_string(),
        password: "password".to_string(),
        debug: true,
        ..Default::default()
    });

    match client.connect() {
        Ok(_) => (),
        Err(e) => panic!("{}", e),
    }

    match client.login() {
        Ok(_) => (),
        Err(e) => panic!("{}", e),
    }

    match client.pwd() {
        Ok(dir) => println!("{}", dir),
        Err(e) => panic!("{}", e),
    }

    match client.cwd("test_data") {
        Ok(_) => (),
        Err(e) => panic!("{}", e),
    }

    // An easy way to retrieve a file
    let remote_file = match client.download("ftpext-charter.txt") {
        Ok(file) => file,
        Err(e) => panic!("{}", e),
    };

    match str::from_utf8(&remote_file) {
        Ok(s) => print!("{}", s),
        Err(e) => panic!("Error reading file data: {}", e),
    };

    // Store a file
    let file_data = "Some awesome file data man!!".to_string();
    let mut reader = Cursor::new(file_data.into_bytes());
    match client.upload("my_random_file.txt", &mut reader) {
        Ok(_) => (),
        Err(e) => panic!("{}", e),
    }

    let _ = client.close();
}
