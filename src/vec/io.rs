//! Binary file I/O for [`BVec`].
//!
//! Format: one `i32` header holding the global scalar length, followed by
//! the scalar entries in global owner order, native-endian. Rank `r`'s
//! payload starts at byte `4 + 8 * scalar_offset(r)`. The format does not
//! depend on the process count.
//!
//! Both operations are collective over the vector's communicator and assume
//! a shared filesystem: the path must name the same file, byte for byte, on
//! every rank, and I/O failures are taken to strike all ranks alike.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::comm::{wire, Communicator};
use crate::error::DofVecError;
use crate::vec::BVec;

const HEADER_LEN: u64 = std::mem::size_of::<i32>() as u64;
const SCALAR_LEN: u64 = std::mem::size_of::<f64>() as u64;

// Sentinel broadcast by rank 0 when the file cannot be opened or the header
// cannot be read.
const HEADER_UNREADABLE: u64 = u64::MAX;

fn io_err(op: &'static str, path: &str, source: std::io::Error) -> DofVecError {
    DofVecError::Io {
        op,
        path: path.to_string(),
        source,
    }
}

impl<C: Communicator> BVec<C> {
    /// Byte offset of this rank's payload plus the global scalar length.
    fn file_layout(&self) -> (u64, u64) {
        let mut sizes = vec![0u64; self.comm.size()];
        self.comm.allgather_u64(self.x.len() as u64, &mut sizes);
        let start: u64 = sizes[..self.comm.rank()].iter().sum();
        let total: u64 = sizes.iter().sum();
        (start, total)
    }

    /// Write the vector to `path`. Collective.
    ///
    /// Rank 0 creates the file and writes the header; every rank then writes
    /// its owned entries at its global offset.
    pub fn write_to_file(&self, path: &str) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        let (start, total) = self.file_layout();

        if self.comm.rank() == 0 {
            let mut f = File::create(path).map_err(|e| io_err("create", path, e))?;
            f.write_all(&(total as i32).to_ne_bytes())
                .map_err(|e| io_err("write", path, e))?;
        }
        // The header must exist before other ranks open for writing.
        self.comm.barrier();

        let mut f = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| io_err("open", path, e))?;
        f.seek(SeekFrom::Start(HEADER_LEN + SCALAR_LEN * start))
            .map_err(|e| io_err("seek", path, e))?;
        f.write_all(wire::cast_slice(&self.x))
            .map_err(|e| io_err("write", path, e))?;
        f.sync_all().map_err(|e| io_err("sync", path, e))?;

        // The file is complete once every rank has written.
        self.comm.barrier();
        Ok(())
    }

    /// Read the vector from `path`. Collective.
    ///
    /// If the stored global length differs from this vector's, the owned
    /// entries are zeroed, nothing is read, and an error is returned. A
    /// missing file is an error on every rank.
    pub fn read_from_file(&mut self, path: &str) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        let (start, total) = self.file_layout();

        // Rank 0 reads the header and broadcasts it; negative or unreadable
        // headers are reported uniformly.
        let mut header = 0u64;
        if self.comm.rank() == 0 {
            header = match File::open(path) {
                Ok(mut f) => {
                    let mut bytes = [0u8; HEADER_LEN as usize];
                    match f.read_exact(&mut bytes) {
                        Ok(()) => {
                            let len = i32::from_ne_bytes(bytes);
                            if len < 0 {
                                HEADER_UNREADABLE
                            } else {
                                len as u64
                            }
                        }
                        Err(_) => HEADER_UNREADABLE,
                    }
                }
                Err(_) => HEADER_UNREADABLE,
            };
        }
        self.comm.bcast_u64(0, &mut header);

        if header == HEADER_UNREADABLE {
            return Err(io_err(
                "open",
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no readable vector header"),
            ));
        }
        if header != total {
            self.x.fill(0.0);
            return Err(DofVecError::FileLengthMismatch {
                path: path.to_string(),
                expected: total as usize,
                found: header as usize,
            });
        }

        let mut f = File::open(path).map_err(|e| io_err("open", path, e))?;
        f.seek(SeekFrom::Start(HEADER_LEN + SCALAR_LEN * start))
            .map_err(|e| io_err("seek", path, e))?;
        f.read_exact(wire::cast_slice_mut(&mut self.x))
            .map_err(|e| io_err("read", path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::comm::NoComm;
    use crate::error::DofVecError;
    use crate::map::VarMap;
    use crate::vec::BVec;

    fn vec_of(nodes: usize, bsize: usize) -> BVec<NoComm> {
        let comm = Arc::new(NoComm);
        let map = Arc::new(VarMap::new(comm, nodes).unwrap());
        BVec::new(map, bsize, None, None, None).unwrap()
    }

    #[test]
    fn write_read_round_trip_serial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vec.bin");
        let path = path.to_str().unwrap();

        let mut v = vec_of(3, 2);
        v.as_mut_slice()
            .copy_from_slice(&[1.0, -2.0, 3.5, 0.0, 4.0, 9.25]);
        v.write_to_file(path).unwrap();

        let mut w = vec_of(3, 2);
        w.read_from_file(path).unwrap();
        assert_eq!(w.as_slice(), v.as_slice());
    }

    #[test]
    fn length_mismatch_zeroes_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vec.bin");
        let path = path.to_str().unwrap();

        let mut v = vec_of(3, 2);
        v.as_mut_slice().fill(1.0);
        v.write_to_file(path).unwrap();

        let mut w = vec_of(4, 2);
        w.as_mut_slice().fill(5.0);
        let err = w.read_from_file(path).unwrap_err();
        assert!(matches!(
            err,
            DofVecError::FileLengthMismatch {
                expected: 8,
                found: 6,
                ..
            }
        ));
        assert!(w.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut v = vec_of(2, 1);
        assert!(matches!(
            v.read_from_file("/nonexistent/dofvec-test.bin"),
            Err(DofVecError::Io { op: "open", .. })
        ));
    }
}
