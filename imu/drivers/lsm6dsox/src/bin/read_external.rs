use imu_traits::SensorSource;
use linux_lsm6dsox::ExternalImu;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = std::env::args().nth(1).unwrap_or_else(|| "/dev/i2c-1".to_string());
    let mut imu = ExternalImu::new(&bus)?;
    println!("Reading external IMU on {} via SensorSource...", bus);

    loop {
        match imu.read() {
            Ok(data) => {
                if let Some(accel) = data.accelerometer {
                    println!(
                        "Accel: x={:.3} m/s², y={:.3} m/s², z={:.3} m/s²",
                        accel.x, accel.y, accel.z
                    );
                }
                if let Some(gyro) = data.gyroscope {
                    println!(
                        "Gyro:  x={:.2} °/s, y={:.2} °/s, z={:.2} °/s",
                        gyro.x, gyro.y, gyro.z
                    );
                }
                if let Some(mag) = data.magnetometer {
                    println!("Mag:   x={:.2} µT, y={:.2} µT, z={:.2} µT", mag.x, mag.y, mag.z);
                }
                println!("----------------------------------------");
            }
            Err(e) => eprintln!("Error reading IMU data: {}", e),
        }

        thread::sleep(Duration::from_millis(100));
    }
}
