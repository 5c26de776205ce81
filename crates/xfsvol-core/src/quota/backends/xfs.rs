//! XFS quota backend.
//!
//! Talks to the kernel directly: project ids through the
//! `FS_IOC_FSGETXATTR`/`FS_IOC_FSSETXATTR` ioctls, limits and quota state
//! through `quotactl(2)` with the XFS project quota commands, and the control
//! device through `mknod(2)`. Everything here needs `CAP_SYS_ADMIN`.
//!
//! The quota interface counts space in 512-byte basic blocks. Byte limits
//! are rounded up to the next block, so the enforced limit is never below
//! the one requested.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::quota::ops::QuotaOps;
use crate::quota::types::{ProjectId, ProjectQuota, Quota};

/// Unit of the XFS quota block counters.
pub const BASIC_BLOCK_SIZE: u64 = 512;

/// Kernel-backed quota operations for XFS mounted with `pquota`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XfsBackend;

impl XfsBackend {
    pub fn new() -> Self {
        Self
    }
}

impl QuotaOps for XfsBackend {
    fn create_control_device(&self, dir: &Path, name: &str) -> io::Result<PathBuf> {
        sys::create_control_device(dir, name)
    }

    fn project_quota_enabled(&self, device: &Path) -> io::Result<bool> {
        sys::project_quota_enabled(device)
    }

    fn get_project_id(&self, dir: &Path) -> io::Result<ProjectId> {
        sys::get_project_id(dir)
    }

    fn set_project_id(&self, dir: &Path, id: ProjectId) -> io::Result<()> {
        sys::set_project_id(dir, id)
    }

    fn get_project_quota(&self, device: &Path, id: ProjectId) -> io::Result<ProjectQuota> {
        sys::get_project_quota(device, id)
    }

    fn set_project_quota(&self, device: &Path, id: ProjectId, quota: &Quota) -> io::Result<()> {
        sys::set_project_quota(device, id, quota)
    }
}

/// Byte limit to basic blocks, rounding up.
fn bytes_to_blocks(bytes: u64) -> u64 {
    bytes.div_ceil(BASIC_BLOCK_SIZE)
}

fn blocks_to_bytes(blocks: u64) -> u64 {
    blocks.saturating_mul(BASIC_BLOCK_SIZE)
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path contains a NUL byte: {}", path.display()),
        )
    })
}

#[cfg(target_os = "linux")]
mod sys {
    use std::fs::{self, File};
    use std::io;
    use std::os::unix::fs::{FileTypeExt, MetadataExt};
    use std::os::unix::io::AsRawFd;
    use std::path::{Path, PathBuf};

    use super::{blocks_to_bytes, bytes_to_blocks, c_path};
    use crate::quota::types::{ProjectId, ProjectQuota, Quota, QuotaUsage};

    // _IOR('X', 31, struct fsxattr) and _IOW('X', 32, struct fsxattr)
    pub(super) const FS_IOC_FSGETXATTR: libc::c_ulong = 0x801c_581f;
    pub(super) const FS_IOC_FSSETXATTR: libc::c_ulong = 0x401c_5820;
    const FS_XFLAG_PROJINHERIT: u32 = 0x0000_0200;

    const PRJQUOTA: i32 = 2;

    const fn xqm_cmd(cmd: i32) -> i32 {
        ((b'X' as i32) << 8) + cmd
    }

    const fn qcmd(cmd: i32, kind: i32) -> i32 {
        (cmd << 8) | (kind & 0xff)
    }

    pub(super) const Q_XGETPQUOTA: i32 = qcmd(xqm_cmd(3), PRJQUOTA);
    pub(super) const Q_XSETPQLIM: i32 = qcmd(xqm_cmd(4), PRJQUOTA);
    pub(super) const Q_XGETPQSTAT: i32 = qcmd(xqm_cmd(5), PRJQUOTA);

    const FS_DQUOT_VERSION: i8 = 1;
    const FS_PROJ_QUOTA: i8 = 2;

    const FS_DQ_ISOFT: u16 = 1 << 0;
    const FS_DQ_IHARD: u16 = 1 << 1;
    const FS_DQ_BSOFT: u16 = 1 << 2;
    const FS_DQ_BHARD: u16 = 1 << 3;

    const FS_QUOTA_PDQ_ACCT: u16 = 1 << 4;
    const FS_QUOTA_PDQ_ENFD: u16 = 1 << 5;

    /// `struct fsxattr` from `linux/fs.h`.
    #[repr(C)]
    #[allow(dead_code)]
    #[derive(Debug, Default, Clone, Copy)]
    pub(super) struct FsXattr {
        pub fsx_xflags: u32,
        pub fsx_extsize: u32,
        pub fsx_nextents: u32,
        pub fsx_projid: u32,
        pub fsx_cowextsize: u32,
        pub fsx_pad: [u8; 8],
    }

    /// `struct fs_disk_quota` from `linux/dqblk_xfs.h`.
    #[repr(C)]
    #[allow(dead_code)]
    #[derive(Debug, Default, Clone, Copy)]
    pub(super) struct FsDiskQuota {
        pub d_version: i8,
        pub d_flags: i8,
        pub d_fieldmask: u16,
        pub d_id: u32,
        pub d_blk_hardlimit: u64,
        pub d_blk_softlimit: u64,
        pub d_ino_hardlimit: u64,
        pub d_ino_softlimit: u64,
        pub d_bcount: u64,
        pub d_icount: u64,
        pub d_itimer: i32,
        pub d_btimer: i32,
        pub d_iwarns: u16,
        pub d_bwarns: u16,
        pub d_itimer_hi: i8,
        pub d_btimer_hi: i8,
        pub d_rtbtimer_hi: i8,
        pub d_padding2: i8,
        pub d_rtb_hardlimit: u64,
        pub d_rtb_softlimit: u64,
        pub d_rtbcount: u64,
        pub d_rtbtimer: i32,
        pub d_rtbwarns: u16,
        pub d_padding3: i16,
        pub d_padding4: [i8; 8],
    }

    /// `struct fs_qfilestat` from `linux/dqblk_xfs.h`.
    #[repr(C)]
    #[allow(dead_code)]
    #[derive(Debug, Default, Clone, Copy)]
    struct FsQfilestat {
        qfs_ino: u64,
        qfs_nblks: u64,
        qfs_nextents: u32,
    }

    /// `struct fs_quota_stat` from `linux/dqblk_xfs.h`.
    #[repr(C)]
    #[allow(dead_code)]
    #[derive(Debug, Default, Clone, Copy)]
    struct FsQuotaStat {
        qs_version: i8,
        qs_flags: u16,
        qs_pad: i8,
        qs_uquota: FsQfilestat,
        qs_gquota: FsQfilestat,
        qs_incoredqs: u32,
        qs_btimelimit: i32,
        qs_itimelimit: i32,
        qs_rtbtimelimit: i32,
        qs_bwarnlimit: u16,
        qs_iwarnlimit: u16,
    }

    fn open_directory(dir: &Path) -> io::Result<File> {
        let meta = fs::metadata(dir)?;
        if !meta.is_dir() {
            return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
        }
        File::open(dir)
    }

    fn quotactl<T>(cmd: i32, device: &Path, id: u32, data: &mut T) -> io::Result<()> {
        let device = c_path(device)?;
        // SAFETY: `device` is NUL-terminated and outlives the call; `data`
        // points to a properly sized repr(C) struct for `cmd`.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_quotactl,
                cmd as libc::c_int,
                device.as_ptr(),
                id as libc::c_int,
                data as *mut T as *mut libc::c_char,
            )
        };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn get_xattr(dir: &File) -> io::Result<FsXattr> {
        let mut attr = FsXattr::default();
        // SAFETY: FS_IOC_FSGETXATTR writes one `struct fsxattr`.
        let rc = unsafe { libc::ioctl(dir.as_raw_fd(), FS_IOC_FSGETXATTR as _, &mut attr as *mut FsXattr) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(attr)
    }

    fn mknod_block(path: &Path, dev: u64) -> io::Result<()> {
        let c = c_path(path)?;
        // SAFETY: `c` is NUL-terminated and outlives the call.
        let rc = unsafe { libc::mknod(c.as_ptr(), libc::S_IFBLK | 0o600, dev as libc::dev_t) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn create_control_device(dir: &Path, name: &str) -> io::Result<PathBuf> {
        let meta = fs::metadata(dir)?;
        if !meta.is_dir() {
            return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
        }

        let path = dir.join(name);
        match mknod_block(&path, meta.dev()) {
            Ok(()) => Ok(path),
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                let existing = fs::symlink_metadata(&path)?;
                if !existing.file_type().is_block_device() {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} exists and is not a block device", path.display()),
                    ));
                }
                // left over from a different mount of the filesystem
                if existing.rdev() != meta.dev() {
                    fs::remove_file(&path)?;
                    mknod_block(&path, meta.dev())?;
                }
                Ok(path)
            }
            Err(e) => Err(e),
        }
    }

    pub(super) fn project_quota_enabled(device: &Path) -> io::Result<bool> {
        let mut stat = FsQuotaStat::default();
        match quotactl(Q_XGETPQSTAT, device, 0, &mut stat) {
            Ok(()) => {
                let wanted = FS_QUOTA_PDQ_ACCT | FS_QUOTA_PDQ_ENFD;
                Ok(stat.qs_flags & wanted == wanted)
            }
            // quotas off entirely, or not an XFS-style quota filesystem
            Err(e) if matches!(e.raw_os_error(), Some(libc::ESRCH) | Some(libc::ENOSYS)) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub(super) fn get_project_id(dir: &Path) -> io::Result<ProjectId> {
        let file = open_directory(dir)?;
        Ok(ProjectId::new(get_xattr(&file)?.fsx_projid))
    }

    pub(super) fn set_project_id(dir: &Path, id: ProjectId) -> io::Result<()> {
        let file = open_directory(dir)?;
        let mut attr = get_xattr(&file)?;
        attr.fsx_projid = id.get();
        attr.fsx_xflags |= FS_XFLAG_PROJINHERIT;

        // SAFETY: FS_IOC_FSSETXATTR reads one `struct fsxattr`.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_FSSETXATTR as _, &attr as *const FsXattr) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn get_project_quota(device: &Path, id: ProjectId) -> io::Result<ProjectQuota> {
        let mut quota = FsDiskQuota::default();
        quotactl(Q_XGETPQUOTA, device, id.get(), &mut quota)?;

        Ok(ProjectQuota {
            limits: Quota {
                size: blocks_to_bytes(quota.d_blk_hardlimit),
                inodes: quota.d_ino_hardlimit,
            },
            usage: QuotaUsage {
                bytes: blocks_to_bytes(quota.d_bcount),
                inodes: quota.d_icount,
            },
        })
    }

    pub(super) fn set_project_quota(device: &Path, id: ProjectId, quota: &Quota) -> io::Result<()> {
        let blocks = bytes_to_blocks(quota.size);
        let mut request = FsDiskQuota {
            d_version: FS_DQUOT_VERSION,
            d_flags: FS_PROJ_QUOTA,
            d_fieldmask: FS_DQ_BHARD | FS_DQ_BSOFT | FS_DQ_IHARD | FS_DQ_ISOFT,
            d_id: id.get(),
            d_blk_hardlimit: blocks,
            d_blk_softlimit: blocks,
            d_ino_hardlimit: quota.inodes,
            d_ino_softlimit: quota.inodes,
            ..FsDiskQuota::default()
        };
        quotactl(Q_XSETPQLIM, device, id.get(), &mut request)
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::io;
    use std::path::{Path, PathBuf};

    use crate::quota::types::{ProjectId, ProjectQuota, Quota};

    fn unsupported<T>() -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "XFS project quotas are only available on Linux",
        ))
    }

    pub(super) fn create_control_device(_dir: &Path, _name: &str) -> io::Result<PathBuf> {
        unsupported()
    }

    pub(super) fn project_quota_enabled(_device: &Path) -> io::Result<bool> {
        unsupported()
    }

    pub(super) fn get_project_id(_dir: &Path) -> io::Result<ProjectId> {
        unsupported()
    }

    pub(super) fn set_project_id(_dir: &Path, _id: ProjectId) -> io::Result<()> {
        unsupported()
    }

    pub(super) fn get_project_quota(_device: &Path, _id: ProjectId) -> io::Result<ProjectQuota> {
        unsupported()
    }

    pub(super) fn set_project_quota(_device: &Path, _id: ProjectId, _quota: &Quota) -> io::Result<()> {
        unsupported()
    }
}
